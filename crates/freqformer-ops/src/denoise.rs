//! Adaptive frequency-domain denoising

use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};
use freqformer_common::{FreqformerError, Result};
use tracing::debug;

use crate::spectral::SpectralCache;

/// Sharpness of the soft high-energy mask.
const MASK_TEMPERATURE: f64 = 10.0;
const ENERGY_EPS: f64 = 1e-6;

/// Shape-preserving denoiser over `[B, L, D]`.
pub trait Denoise: Send + Sync {
    fn denoise(&self, xs: &Tensor) -> Result<Tensor>;
}

/// Learned spectral filter with an extra filter on dominant frequencies.
///
/// ```text
/// X      = rfft(x)                               per channel
/// energy = sum_d |X|^2, normalized by its mean over frequencies (per sample)
/// mask   = sigmoid(T * (energy - threshold))
/// y      = irfft(X * W + (X * mask) * W_high)
/// ```
///
/// `W`, `W_high` are complex per-channel weights stored as `[d_model, 2]`
/// (real, imaginary). The mask is computed per sample, so batches never mix.
#[derive(Debug, Clone)]
pub struct AdaptiveFreqDenoise {
    dim: usize,
    weight: Tensor,
    weight_high: Tensor,
    threshold: Tensor,
    spectral: SpectralCache,
}

impl AdaptiveFreqDenoise {
    pub fn new(dim: usize, vb: VarBuilder) -> Result<Self> {
        if dim == 0 {
            return Err(FreqformerError::config("denoise block needs a non-zero width"));
        }
        let init = Init::Randn { mean: 0.0, stdev: 0.02 };
        let weight = vb.get_with_hints((dim, 2), "complex_weight", init)?;
        let weight_high = vb.get_with_hints((dim, 2), "complex_weight_high", init)?;
        let threshold = vb.get_with_hints(1, "threshold", Init::Const(0.25))?;
        debug!(dim, "built adaptive frequency denoise block");
        Ok(Self { dim, weight, weight_high, threshold, spectral: SpectralCache::new() })
    }

    pub fn with_spectral_cache(mut self, spectral: SpectralCache) -> Self {
        self.spectral = spectral;
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Soft mask over frequency bins, `[B, F, 1]`.
    pub fn energy_mask(&self, re: &Tensor, im: &Tensor) -> Result<Tensor> {
        let energy = (re.sqr()? + im.sqr()?)?.sum_keepdim(2)?;
        let mean = energy.mean_keepdim(1)?.affine(1.0, ENERGY_EPS)?;
        let normalized = energy.broadcast_div(&mean)?;
        let shifted = normalized.broadcast_sub(&self.threshold)?.affine(MASK_TEMPERATURE, 0.0)?;
        Ok(candle_nn::ops::sigmoid(&shifted)?)
    }

    fn complex_mul(re: &Tensor, im: &Tensor, weight: &Tensor) -> Result<(Tensor, Tensor)> {
        let w_re = weight.narrow(1, 0, 1)?.squeeze(1)?;
        let w_im = weight.narrow(1, 1, 1)?.squeeze(1)?;
        let out_re = (re.broadcast_mul(&w_re)? - im.broadcast_mul(&w_im)?)?;
        let out_im = (re.broadcast_mul(&w_im)? + im.broadcast_mul(&w_re)?)?;
        Ok((out_re, out_im))
    }
}

impl Denoise for AdaptiveFreqDenoise {
    fn denoise(&self, xs: &Tensor) -> Result<Tensor> {
        let (_, _, channels) = xs.dims3()?;
        if channels != self.dim {
            return Err(FreqformerError::shape_mismatch(
                &[self.dim],
                &[channels],
                "frequency denoise channels",
            ));
        }
        let basis = self.spectral.for_input(xs)?;
        let (re, im) = basis.rfft(xs)?;

        let (base_re, base_im) = Self::complex_mul(&re, &im, &self.weight)?;

        let mask = self.energy_mask(&re, &im)?;
        let masked_re = re.broadcast_mul(&mask)?;
        let masked_im = im.broadcast_mul(&mask)?;
        let (high_re, high_im) = Self::complex_mul(&masked_re, &masked_im, &self.weight_high)?;

        basis.irfft(&(base_re + high_re)?, &(base_im + high_im)?)
    }
}
