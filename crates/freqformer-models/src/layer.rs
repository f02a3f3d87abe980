//! Decoder layer with per-block seasonal/trend decomposition

use std::fmt;

use candle_core::{Module, Tensor};
use candle_nn::{Dropout, LayerNorm, VarBuilder};
use freqformer_common::{Activation, DecoderLayerConfig, FreqformerError, Result};
use freqformer_ops::{
    AdaptiveFreqDenoise, CircularConv1d, Denoise, FourierDecomp, PointwiseConv1d,
    SeriesDecomposition, SpectralCache,
};
use tracing::{debug, trace};

use crate::attention::{AttentionModule, MultiHeadAttention};

/// Kernel width of the trend projection.
const TREND_KERNEL: usize = 3;

/// Whether a layer denoises its seasonal output, fixed at build time.
#[derive(Debug, Clone)]
pub enum DenoiseStage {
    Enabled(AdaptiveFreqDenoise),
    Disabled,
}

impl DenoiseStage {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    fn apply(&self, xs: Tensor) -> Result<Tensor> {
        match self {
            Self::Enabled(block) => block.denoise(&xs),
            Self::Disabled => Ok(xs),
        }
    }
}

/// One decoder block.
///
/// ```text
/// x, t1 = decomp1(norm1(x + dropout(self_attn(x, x, x))))
/// x, t2 = decomp2(norm2(x + dropout(cross_attn(x, cross, cross))))
/// x, t3 = decomp3(x + ffn(x))
/// trend = circular_conv(t1 + t2 + t3)                 d_model -> c_out
/// x     = norm3(denoise(x))                           denoise optional
/// ```
///
/// The three decompositions and three norms are separate instances with
/// their own variables (`decomp1.*`, `norm1.*`, ...).
pub struct DecoderLayer {
    config: DecoderLayerConfig,
    activation: Activation,
    self_attention: Box<dyn AttentionModule>,
    cross_attention: Box<dyn AttentionModule>,
    conv1: PointwiseConv1d,
    conv2: PointwiseConv1d,
    decomp1: FourierDecomp,
    decomp2: FourierDecomp,
    decomp3: FourierDecomp,
    dropout: Dropout,
    projection: CircularConv1d,
    denoise: DenoiseStage,
    norm1: LayerNorm,
    norm2: LayerNorm,
    norm3: LayerNorm,
}

impl DecoderLayer {
    pub fn new(
        config: DecoderLayerConfig,
        self_attention: Box<dyn AttentionModule>,
        cross_attention: Box<dyn AttentionModule>,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        let activation = config.activation()?;
        let d_model = config.d_model;
        let d_ff = config.resolved_d_ff();

        for (name, attn) in [("self", &self_attention), ("cross", &cross_attention)] {
            if attn.d_model() != d_model {
                return Err(FreqformerError::Config(format!(
                    "{name}-attention width {} does not match d_model {d_model}",
                    attn.d_model()
                )));
            }
        }

        let conv1 = PointwiseConv1d::new(d_model, d_ff, vb.pp("conv1"))?;
        let conv2 = PointwiseConv1d::new(d_ff, d_model, vb.pp("conv2"))?;

        // All four spectral operators see [B, L, d_model] series of one length.
        let spectral = SpectralCache::new();
        let decomp = |name: &str| -> Result<FourierDecomp> {
            Ok(FourierDecomp::new(config.series_decomp, d_model, vb.pp(name))?
                .with_spectral_cache(spectral.clone()))
        };
        let decomp1 = decomp("decomp1")?;
        let decomp2 = decomp("decomp2")?;
        let decomp3 = decomp("decomp3")?;

        let projection =
            CircularConv1d::new(d_model, config.c_out, TREND_KERNEL, vb.pp("projection"))?;

        let denoise = if config.use_apdc {
            let block = AdaptiveFreqDenoise::new(d_model, vb.pp("apdc"))?;
            DenoiseStage::Enabled(block.with_spectral_cache(spectral))
        } else {
            DenoiseStage::Disabled
        };

        let eps = config.layer_norm_eps;
        let norm1 = candle_nn::layer_norm(d_model, eps, vb.pp("norm1"))?;
        let norm2 = candle_nn::layer_norm(d_model, eps, vb.pp("norm2"))?;
        let norm3 = candle_nn::layer_norm(d_model, eps, vb.pp("norm3"))?;

        debug!(
            d_model,
            d_ff,
            c_out = config.c_out,
            activation = %activation,
            use_apdc = config.use_apdc,
            "built decoder layer"
        );

        Ok(Self {
            activation,
            self_attention,
            cross_attention,
            conv1,
            conv2,
            decomp1,
            decomp2,
            decomp3,
            dropout: Dropout::new(config.dropout),
            projection,
            denoise,
            norm1,
            norm2,
            norm3,
            config,
        })
    }

    /// Build a layer whose self- and cross-attention are multi-head attention
    /// with `n_heads` heads.
    pub fn from_config(config: DecoderLayerConfig, n_heads: usize, vb: VarBuilder) -> Result<Self> {
        let attn_config = freqformer_common::AttentionConfig::new(config.d_model, n_heads)
            .with_dropout(config.dropout);
        let self_attention = MultiHeadAttention::new(attn_config.clone(), vb.pp("self_attention"))?;
        let cross_attention = MultiHeadAttention::new(attn_config, vb.pp("cross_attention"))?;
        Self::new(config, Box::new(self_attention), Box::new(cross_attention), vb)
    }

    pub fn config(&self) -> &DecoderLayerConfig {
        &self.config
    }

    pub fn denoise_enabled(&self) -> bool {
        self.denoise.is_enabled()
    }

    pub fn decomp1(&self) -> &FourierDecomp {
        &self.decomp1
    }

    pub fn decomp2(&self) -> &FourierDecomp {
        &self.decomp2
    }

    pub fn decomp3(&self) -> &FourierDecomp {
        &self.decomp3
    }

    /// Eval-mode forward pass, dropout disabled.
    pub fn forward(
        &self,
        x: &Tensor,
        cross: &Tensor,
        x_mask: Option<&Tensor>,
        cross_mask: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        self.forward_t(x, cross, x_mask, cross_mask, false)
    }

    /// Returns `(seasonal [B, L, d_model], residual_trend [B, L, c_out])`.
    pub fn forward_t(
        &self,
        x: &Tensor,
        cross: &Tensor,
        x_mask: Option<&Tensor>,
        cross_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        self.check_inputs(x, cross)?;

        let (attn, _) = self.self_attention.forward_t(x, x, x, x_mask, train)?;
        let x = self.norm1.forward(&(x + self.dropout.forward(&attn, train)?)?)?;
        let (x, trend1) = self.decomp1.decompose(&x)?;

        let (attn, _) = self.cross_attention.forward_t(&x, cross, cross, cross_mask, train)?;
        let x = self.norm2.forward(&(&x + self.dropout.forward(&attn, train)?)?)?;
        let (x, trend2) = self.decomp2.decompose(&x)?;

        let y = self.feed_forward(&x, train)?;
        let (x, trend3) = self.decomp3.decompose(&(&x + &y)?)?;

        let residual_trend = ((trend1 + trend2)? + trend3)?;
        let residual_trend = self.projection.forward(&residual_trend)?;

        let x = self.denoise.apply(x)?;
        trace!(shape = ?x.dims(), denoise = self.denoise.is_enabled(), "decoder layer forward");

        Ok((self.norm3.forward(&x)?, residual_trend))
    }

    /// conv1 -> activation -> dropout -> conv2 -> dropout, on `[B, L, d_model]`.
    fn feed_forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let y = x.transpose(1, 2)?.contiguous()?;
        let y = self.conv1.forward(&y)?;
        let y = self.dropout.forward(&self.activation.apply(&y)?, train)?;
        let y = self.conv2.forward(&y)?.transpose(1, 2)?.contiguous()?;
        Ok(self.dropout.forward(&y, train)?)
    }

    fn check_inputs(&self, x: &Tensor, cross: &Tensor) -> Result<()> {
        let d_model = self.config.d_model;
        let (batch, seq_len, channels) = x.dims3()?;
        if channels != d_model {
            return Err(FreqformerError::shape_mismatch(
                &[batch, seq_len, d_model],
                x.dims(),
                "decoder layer input",
            ));
        }
        let (cross_batch, src_len, cross_channels) = cross.dims3()?;
        if cross_batch != batch || cross_channels != d_model {
            return Err(FreqformerError::shape_mismatch(
                &[batch, src_len, d_model],
                cross.dims(),
                "decoder layer cross context",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for DecoderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderLayer")
            .field("config", &self.config)
            .field("activation", &self.activation)
            .field("denoise", &self.denoise.is_enabled())
            .finish()
    }
}
