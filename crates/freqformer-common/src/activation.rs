//! Feed-forward activation selection

use std::fmt;
use std::str::FromStr;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::FreqformerError;

/// Activation applied between the two pointwise convolutions of a layer.
///
/// Only two kinds exist, named exactly `relu` and `gelu`. Any other name,
/// including a differently cased or padded one, is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    /// Exact (erf based) GELU.
    Gelu,
}

impl Activation {
    pub fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Relu => xs.relu(),
            Self::Gelu => xs.gelu_erf(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Gelu => "gelu",
        }
    }
}

impl FromStr for Activation {
    type Err = FreqformerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relu" => Ok(Self::Relu),
            "gelu" => Ok(Self::Gelu),
            other => Err(FreqformerError::Config(format!(
                "unsupported activation '{other}', expected one of: relu, gelu"
            ))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn parses_known_names() {
        assert_eq!("relu".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("gelu".parse::<Activation>().unwrap(), Activation::Gelu);
    }

    #[test]
    fn names_are_matched_exactly() {
        for name in ["GELU", " gelu ", "Relu", "relu\n", ""] {
            let err = name.parse::<Activation>().unwrap_err();
            assert!(matches!(err, FreqformerError::Config(_)), "accepted {name:?}");
        }
    }

    #[test]
    fn rejects_swish() {
        let err = "swish".parse::<Activation>().unwrap_err();
        assert!(matches!(err, FreqformerError::Config(_)));
        assert!(err.to_string().contains("swish"));
    }

    #[test]
    fn relu_zeroes_negatives() -> candle_core::Result<()> {
        let xs = Tensor::new(&[-1.0f32, 0.0, 2.0], &Device::Cpu)?;
        let ys = Activation::Relu.apply(&xs)?.to_vec1::<f32>()?;
        assert_eq!(ys, vec![0.0, 0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn gelu_matches_reference_points() -> candle_core::Result<()> {
        let xs = Tensor::new(&[0.0f32, 1.0], &Device::Cpu)?;
        let ys = Activation::Gelu.apply(&xs)?.to_vec1::<f32>()?;
        assert!(ys[0].abs() < 1e-6);
        // 0.5 * (1 + erf(1/sqrt(2)))
        assert!((ys[1] - 0.841_344_7).abs() < 1e-4, "gelu(1)={}", ys[1]);
        Ok(())
    }
}
