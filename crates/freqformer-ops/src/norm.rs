//! Layer normalization for seasonal series

use candle_core::{Module, Tensor};
use candle_nn::{LayerNorm, VarBuilder};
use freqformer_common::Result;

/// Layer norm over channels followed by removing the per-channel mean over
/// the sequence axis, so the output carries no DC (trend) component.
#[derive(Debug, Clone)]
pub struct SeasonalLayerNorm {
    norm: LayerNorm,
}

impl SeasonalLayerNorm {
    pub fn new(d_model: usize, eps: f64, vb: VarBuilder) -> Result<Self> {
        Ok(Self { norm: candle_nn::layer_norm(d_model, eps, vb)? })
    }
}

impl Module for SeasonalLayerNorm {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let x_hat = self.norm.forward(xs)?;
        let bias = x_hat.mean_keepdim(1)?;
        x_hat.broadcast_sub(&bias)
    }
}
