//! Real discrete Fourier transform over the sequence axis
//!
//! The transform is expressed as dense basis matrices so it runs on any
//! candle device and stays differentiable:
//!
//! ```text
//! re[k] =  sum_t x[t] * cos(2*pi*k*t/L)
//! im[k] = -sum_t x[t] * sin(2*pi*k*t/L)          k in 0..=L/2
//! x[t]  = 1/L * sum_k w[k] * (re[k]*cos(..) - im[k]*sin(..))
//! ```
//!
//! with `w[0] = 1`, `w[L/2] = 1` for even `L`, and `w[k] = 2` otherwise.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use candle_core::{DType, Device, Tensor};
use freqformer_common::{FreqformerError, Result};

/// Forward and inverse real-DFT matrices for one sequence length.
#[derive(Debug, Clone)]
pub struct SpectralBasis {
    seq_len: usize,
    n_freq: usize,
    /// `[n_freq, seq_len]`
    fwd_re: Tensor,
    fwd_im: Tensor,
    /// `[seq_len, n_freq]`
    inv_re: Tensor,
    inv_im: Tensor,
}

impl SpectralBasis {
    pub fn new(seq_len: usize, dtype: DType, device: &Device) -> Result<Self> {
        if seq_len == 0 {
            return Err(FreqformerError::config("spectral basis needs a non-empty sequence"));
        }
        let n_freq = seq_len / 2 + 1;

        let mut fwd_re = Vec::with_capacity(n_freq * seq_len);
        let mut fwd_im = Vec::with_capacity(n_freq * seq_len);
        for k in 0..n_freq {
            for t in 0..seq_len {
                let angle = 2.0 * PI * ((k * t) % seq_len) as f64 / seq_len as f64;
                fwd_re.push(angle.cos() as f32);
                fwd_im.push(-angle.sin() as f32);
            }
        }

        let mut inv_re = Vec::with_capacity(seq_len * n_freq);
        let mut inv_im = Vec::with_capacity(seq_len * n_freq);
        for t in 0..seq_len {
            for k in 0..n_freq {
                let nyquist = seq_len % 2 == 0 && k == seq_len / 2;
                let weight = if k == 0 || nyquist { 1.0 } else { 2.0 };
                let angle = 2.0 * PI * ((k * t) % seq_len) as f64 / seq_len as f64;
                inv_re.push((weight * angle.cos() / seq_len as f64) as f32);
                inv_im.push((-weight * angle.sin() / seq_len as f64) as f32);
            }
        }

        Ok(Self {
            seq_len,
            n_freq,
            fwd_re: Tensor::from_vec(fwd_re, (n_freq, seq_len), device)?.to_dtype(dtype)?,
            fwd_im: Tensor::from_vec(fwd_im, (n_freq, seq_len), device)?.to_dtype(dtype)?,
            inv_re: Tensor::from_vec(inv_re, (seq_len, n_freq), device)?.to_dtype(dtype)?,
            inv_im: Tensor::from_vec(inv_im, (seq_len, n_freq), device)?.to_dtype(dtype)?,
        })
    }

    /// Basis matching the sequence length, dtype and device of `xs`.
    pub fn for_input(xs: &Tensor) -> Result<Self> {
        let (batch, seq_len, channels) = xs.dims3()?;
        if seq_len == 0 {
            return Err(FreqformerError::shape_mismatch(
                &[batch, 1, channels],
                xs.dims(),
                "spectral input needs a non-empty sequence",
            ));
        }
        Self::new(seq_len, xs.dtype(), xs.device())
    }

    fn matches(&self, xs: &Tensor) -> bool {
        xs.dim(1).is_ok_and(|seq_len| seq_len == self.seq_len)
            && xs.dtype() == self.fwd_re.dtype()
            && xs.device().same_device(self.fwd_re.device())
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn n_freq(&self) -> usize {
        self.n_freq
    }

    /// `[B, L, D] -> ([B, F, D], [B, F, D])`
    pub fn rfft(&self, xs: &Tensor) -> Result<(Tensor, Tensor)> {
        let xs = self.check_input(xs)?;
        let re = self.fwd_re.broadcast_matmul(&xs)?;
        let im = self.fwd_im.broadcast_matmul(&xs)?;
        Ok((re, im))
    }

    /// `([B, F, D], [B, F, D]) -> [B, L, D]`
    pub fn irfft(&self, re: &Tensor, im: &Tensor) -> Result<Tensor> {
        let (_, n_freq, _) = re.dims3()?;
        if n_freq != self.n_freq || re.dims() != im.dims() {
            return Err(FreqformerError::shape_mismatch(
                &[self.n_freq],
                re.dims(),
                "inverse DFT spectrum",
            ));
        }
        let real = self.inv_re.broadcast_matmul(&re.contiguous()?)?;
        let imag = self.inv_im.broadcast_matmul(&im.contiguous()?)?;
        Ok((real + imag)?)
    }

    /// Reconstruct `xs` from its lowest `cutoff` frequency bins only.
    pub fn low_pass(&self, xs: &Tensor, cutoff: usize) -> Result<Tensor> {
        let xs = self.check_input(xs)?;
        let cutoff = cutoff.clamp(1, self.n_freq);

        let fwd_re = self.fwd_re.narrow(0, 0, cutoff)?;
        let fwd_im = self.fwd_im.narrow(0, 0, cutoff)?;
        let inv_re = self.inv_re.narrow(1, 0, cutoff)?.contiguous()?;
        let inv_im = self.inv_im.narrow(1, 0, cutoff)?.contiguous()?;

        let re = fwd_re.broadcast_matmul(&xs)?;
        let im = fwd_im.broadcast_matmul(&xs)?;
        Ok((inv_re.broadcast_matmul(&re)? + inv_im.broadcast_matmul(&im)?)?)
    }

    fn check_input(&self, xs: &Tensor) -> Result<Tensor> {
        let (_, seq_len, _) = xs.dims3()?;
        if seq_len != self.seq_len {
            return Err(FreqformerError::shape_mismatch(
                &[self.seq_len],
                &[seq_len],
                "spectral basis sequence length",
            ));
        }
        Ok(xs.contiguous()?)
    }
}

/// Keeps the last basis built, reused while inputs keep the same sequence
/// length, dtype and device. Clones share the cached entry.
#[derive(Debug, Clone, Default)]
pub struct SpectralCache {
    basis: Arc<Mutex<Option<SpectralBasis>>>,
}

impl SpectralCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_input(&self, xs: &Tensor) -> Result<SpectralBasis> {
        let mut slot = self.basis.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(basis) = slot.as_ref().filter(|basis| basis.matches(xs)) {
            return Ok(basis.clone());
        }
        let basis = SpectralBasis::for_input(xs)?;
        *slot = Some(basis.clone());
        Ok(basis)
    }
}
