//! Seasonal/trend series decomposition

use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};
use freqformer_common::{FreqformerError, Result};
use tracing::debug;

use crate::spectral::SpectralCache;

/// Splits a `[B, L, D]` series into `(seasonal, trend)`, both shaped like
/// the input.
pub trait SeriesDecomposition: Send + Sync {
    fn decompose(&self, xs: &Tensor) -> Result<(Tensor, Tensor)>;
}

/// Frequency-domain decomposition.
///
/// The trend is the reconstruction from the lowest `ceil(ratio * n_freq)`
/// bins (at least the DC bin), scaled per channel by a learned gain. The
/// seasonal part is whatever remains, so `seasonal + trend == xs`.
#[derive(Debug, Clone)]
pub struct FourierDecomp {
    ratio: f64,
    d_model: usize,
    trend_gain: Tensor,
    spectral: SpectralCache,
}

impl FourierDecomp {
    pub fn new(ratio: f64, d_model: usize, vb: VarBuilder) -> Result<Self> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(FreqformerError::Config(format!(
                "decomposition ratio must be in (0, 1], got {ratio}"
            )));
        }
        let trend_gain = vb.get_with_hints(d_model, "trend_gain", Init::Const(1.0))?;
        debug!(ratio, d_model, "built fourier decomposition");
        Ok(Self { ratio, d_model, trend_gain, spectral: SpectralCache::new() })
    }

    /// Share DFT matrices with other operators running on the same series.
    pub fn with_spectral_cache(mut self, spectral: SpectralCache) -> Self {
        self.spectral = spectral;
        self
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Number of low-frequency bins kept as trend for a spectrum of `n_freq` bins.
    pub fn cutoff(&self, n_freq: usize) -> usize {
        ((self.ratio * n_freq as f64).ceil() as usize).clamp(1, n_freq.max(1))
    }

    pub fn trend_gain(&self) -> &Tensor {
        &self.trend_gain
    }
}

impl SeriesDecomposition for FourierDecomp {
    fn decompose(&self, xs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (_, _, channels) = xs.dims3()?;
        if channels != self.d_model {
            return Err(FreqformerError::shape_mismatch(
                &[self.d_model],
                &[channels],
                "fourier decomposition channels",
            ));
        }
        let basis = self.spectral.for_input(xs)?;
        let trend = basis.low_pass(xs, self.cutoff(basis.n_freq()))?;
        let trend = trend.broadcast_mul(&self.trend_gain)?;
        let seasonal = (xs - &trend)?;
        Ok((seasonal, trend))
    }
}

/// Moving-average decomposition with replicate padding at both ends.
///
/// Parameter free; kept as an alternative trend extractor for callers that
/// want a time-domain decomposition.
#[derive(Debug, Clone)]
pub struct MovingAvgDecomp {
    kernel_size: usize,
}

impl MovingAvgDecomp {
    pub fn new(kernel_size: usize) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(FreqformerError::Config(format!(
                "moving average kernel must be odd and non-zero, got {kernel_size}"
            )));
        }
        Ok(Self { kernel_size })
    }
}

impl MovingAvgDecomp {
    /// Moving-average trend of `[B, L, D]`.
    pub fn trend(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, channels) = xs.dims3()?;
        if seq_len == 0 {
            return Err(FreqformerError::shape_mismatch(
                &[batch, 1, channels],
                xs.dims(),
                "moving average needs a non-empty sequence",
            ));
        }
        let pad = (self.kernel_size - 1) / 2;
        if pad == 0 {
            return Ok(xs.clone());
        }
        let front = xs.narrow(1, 0, 1)?.repeat((1, pad, 1))?;
        let back = xs.narrow(1, seq_len - 1, 1)?.repeat((1, pad, 1))?;
        let padded = Tensor::cat(&[&front, xs, &back], 1)?;
        let windows = (0..seq_len)
            .map(|t| padded.narrow(1, t, self.kernel_size)?.mean_keepdim(1))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::cat(&windows, 1)?)
    }
}

impl SeriesDecomposition for MovingAvgDecomp {
    fn decompose(&self, xs: &Tensor) -> Result<(Tensor, Tensor)> {
        let trend = self.trend(xs)?;
        let seasonal = (xs - &trend)?;
        Ok((seasonal, trend))
    }
}
