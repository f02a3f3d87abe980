//! Decoder stack and trend accumulation

use std::fmt;

use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;
use freqformer_common::{DecoderConfig, FreqformerError, Result};
use freqformer_ops::SeasonalLayerNorm;
use tracing::{debug, trace};

use crate::layer::DecoderLayer;

/// Optional post-processing stage applied to the final seasonal state.
pub type SeasonalHead = Box<dyn Module + Send + Sync>;

/// Runs decoder layers in order and sums their trend outputs.
///
/// The optional final norm and projection only touch the seasonal state;
/// the accumulated trend is returned as summed.
pub struct Decoder {
    layers: Vec<DecoderLayer>,
    norm: Option<SeasonalHead>,
    projection: Option<SeasonalHead>,
}

impl Decoder {
    pub fn new(
        layers: Vec<DecoderLayer>,
        norm: Option<SeasonalHead>,
        projection: Option<SeasonalHead>,
    ) -> Result<Self> {
        if layers.is_empty() {
            return Err(FreqformerError::config("decoder needs at least one layer"));
        }
        Ok(Self { layers, norm, projection })
    }

    /// Build `num_layers` multi-head attention layers, a seasonal layer norm
    /// and a `d_model -> c_out` linear projection, as configured.
    pub fn from_config(config: DecoderConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let layer_config = &config.layer;

        let mut layers = Vec::with_capacity(config.num_layers);
        for i in 0..config.num_layers {
            layers.push(DecoderLayer::from_config(
                layer_config.clone(),
                config.n_heads,
                vb.pp(format!("layers.{i}")),
            )?);
        }

        let norm = if config.final_norm {
            let norm = SeasonalLayerNorm::new(
                layer_config.d_model,
                layer_config.layer_norm_eps,
                vb.pp("norm"),
            )?;
            Some(Box::new(norm) as SeasonalHead)
        } else {
            None
        };

        let projection = if config.projection {
            let linear =
                candle_nn::linear(layer_config.d_model, layer_config.c_out, vb.pp("projection"))?;
            Some(Box::new(linear) as SeasonalHead)
        } else {
            None
        };

        debug!(
            num_layers = config.num_layers,
            final_norm = config.final_norm,
            projection = config.projection,
            "built decoder"
        );
        Self::new(layers, norm, projection)
    }

    pub fn layers(&self) -> &[DecoderLayer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Eval-mode forward pass, dropout disabled.
    pub fn forward(
        &self,
        x: &Tensor,
        cross: &Tensor,
        x_mask: Option<&Tensor>,
        cross_mask: Option<&Tensor>,
        trend: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        self.forward_t(x, cross, x_mask, cross_mask, trend, false)
    }

    /// Returns `(seasonal, trend)`. `trend` starts from the given tensor, or
    /// from the first layer's residual trend when `None`.
    pub fn forward_t(
        &self,
        x: &Tensor,
        cross: &Tensor,
        x_mask: Option<&Tensor>,
        cross_mask: Option<&Tensor>,
        trend: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let mut x = x.clone();
        let mut trend = trend.cloned();

        for (i, layer) in self.layers.iter().enumerate() {
            let (seasonal, residual_trend) = layer.forward_t(&x, cross, x_mask, cross_mask, train)?;
            trend = Some(match trend {
                Some(acc) => {
                    if acc.dims() != residual_trend.dims() {
                        return Err(FreqformerError::shape_mismatch(
                            residual_trend.dims(),
                            acc.dims(),
                            "decoder trend accumulator",
                        ));
                    }
                    (acc + residual_trend)?
                }
                None => residual_trend,
            });
            trace!(layer = i, "decoder layer done");
            x = seasonal;
        }

        if let Some(norm) = &self.norm {
            x = norm.forward(&x)?;
        }
        if let Some(projection) = &self.projection {
            x = projection.forward(&x)?;
        }

        let trend = trend.ok_or_else(|| FreqformerError::config("decoder has no layers"))?;
        Ok((x, trend))
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("layers", &self.layers)
            .field("norm", &self.norm.is_some())
            .field("projection", &self.projection.is_some())
            .finish()
    }
}
