//! Attention contract and multi-head attention

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};
use freqformer_common::{AttentionConfig, FreqformerError, Result};
use tracing::debug;

/// Query/key/value attention.
///
/// Queries are `[B, L, d_model]`, keys and values `[B, S, d_model]`. The
/// optional mask must broadcast to `[B, heads, L, S]`. A float mask is added
/// to the scores; an integer (boolean) mask blocks every position where it
/// is non-zero.
/// Returns the attended output `[B, L, d_model]` and, when the
/// implementation records them, the attention weights.
pub trait AttentionModule: Send + Sync {
    fn d_model(&self) -> usize;

    fn forward_t(
        &self,
        queries: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        attn_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Option<Tensor>)>;

    fn forward(
        &self,
        queries: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        attn_mask: Option<&Tensor>,
    ) -> Result<(Tensor, Option<Tensor>)> {
        self.forward_t(queries, keys, values, attn_mask, false)
    }
}

/// Multi-Head Attention Layer
pub struct MultiHeadAttention {
    config: AttentionConfig,
    n_heads: usize,
    head_dim: usize,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    o_proj: Linear,
    dropout: Dropout,
}

impl MultiHeadAttention {
    pub fn new(config: AttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let d_model = config.d_model;

        let q_proj = candle_nn::linear(d_model, d_model, vb.pp("q_proj"))?;
        let k_proj = candle_nn::linear(d_model, d_model, vb.pp("k_proj"))?;
        let v_proj = candle_nn::linear(d_model, d_model, vb.pp("v_proj"))?;
        let o_proj = candle_nn::linear(d_model, d_model, vb.pp("o_proj"))?;

        debug!(d_model, n_heads = config.n_heads, "built multi-head attention");
        Ok(Self {
            n_heads: config.n_heads,
            head_dim: config.head_dim(),
            dropout: Dropout::new(config.dropout),
            config,
            q_proj,
            k_proj,
            v_proj,
            o_proj,
        })
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// `[B, T, d_model] -> [B, H, T, head_dim]`
    fn split_heads(&self, xs: &Tensor, proj: &Linear) -> Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        Ok(proj
            .forward(xs)?
            .reshape((batch, seq_len, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }
}

impl AttentionModule for MultiHeadAttention {
    fn d_model(&self) -> usize {
        self.config.d_model
    }

    fn forward_t(
        &self,
        queries: &Tensor,
        keys: &Tensor,
        values: &Tensor,
        attn_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Option<Tensor>)> {
        let d_model = self.config.d_model;
        let (batch, q_len, q_dim) = queries.dims3()?;
        let (k_batch, k_len, k_dim) = keys.dims3()?;
        if q_dim != d_model || k_dim != d_model || k_batch != batch {
            return Err(FreqformerError::shape_mismatch(
                &[batch, k_len, d_model],
                keys.dims(),
                "attention keys",
            ));
        }
        if values.dims() != keys.dims() {
            return Err(FreqformerError::shape_mismatch(
                keys.dims(),
                values.dims(),
                "attention values",
            ));
        }

        let q = self.split_heads(queries, &self.q_proj)?;
        let k = self.split_heads(keys, &self.k_proj)?;
        let v = self.split_heads(values, &self.v_proj)?;

        // Scaled dot-product attention
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q.matmul(&k.transpose(2, 3)?.contiguous()?)?.affine(scale, 0.0)?;
        let scores = match attn_mask {
            Some(mask) => apply_mask(&scores, mask)?,
            None => scores,
        };

        let attn_weights = candle_nn::ops::softmax_last_dim(&scores)?;
        let attn_weights = self.dropout.forward(&attn_weights, train)?;
        let attn_output = attn_weights.matmul(&v)?;

        let attn_output = attn_output.transpose(1, 2)?.reshape((batch, q_len, d_model))?;
        let output = self.o_proj.forward(&attn_output)?;

        Ok((output, self.config.output_attention.then_some(attn_weights)))
    }
}

fn apply_mask(scores: &Tensor, mask: &Tensor) -> Result<Tensor> {
    match mask.dtype() {
        DType::U8 | DType::U32 | DType::I64 => {
            let blocked = mask.broadcast_as(scores.shape())?;
            let neg_inf = Tensor::new(f32::NEG_INFINITY, scores.device())?
                .to_dtype(scores.dtype())?
                .broadcast_as(scores.shape())?;
            Ok(blocked.where_cond(&neg_inf, scores)?)
        }
        _ => Ok(scores.broadcast_add(&mask.to_dtype(scores.dtype())?)?),
    }
}

/// Additive causal mask `[len, len]`: zero on and below the diagonal,
/// `-inf` above it.
pub fn causal_mask(len: usize, device: &Device) -> Result<Tensor> {
    let mut mask_vec = vec![0.0f32; len * len];
    for i in 0..len {
        for j in (i + 1)..len {
            mask_vec[i * len + j] = f32::NEG_INFINITY;
        }
    }
    Ok(Tensor::from_vec(mask_vec, (len, len), device)?)
}
