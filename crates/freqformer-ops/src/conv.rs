//! Sequence-axis convolutions over `[batch, seq_len, channels]` tensors

use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, VarBuilder};
use freqformer_common::{FreqformerError, Result};

/// No-bias convolution with wrap-around padding of `kernel / 2` on both
/// ends, stride 1. Output length equals input length.
#[derive(Debug, Clone)]
pub struct CircularConv1d {
    conv: Conv1d,
    in_channels: usize,
    out_channels: usize,
    pad: usize,
}

impl CircularConv1d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(FreqformerError::Config(format!(
                "circular convolution needs an odd kernel, got {kernel_size}"
            )));
        }
        let conv = candle_nn::conv1d_no_bias(
            in_channels,
            out_channels,
            kernel_size,
            Conv1dConfig::default(),
            vb,
        )?;
        Ok(Self { conv, in_channels, out_channels, pad: kernel_size / 2 })
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// `[B, L, C_in] -> [B, L, C_out]`
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (_, seq_len, channels) = xs.dims3()?;
        if channels != self.in_channels {
            return Err(FreqformerError::shape_mismatch(
                &[self.in_channels],
                &[channels],
                "circular conv input channels",
            ));
        }
        if seq_len < self.pad {
            return Err(FreqformerError::shape_mismatch(
                &[self.pad],
                &[seq_len],
                "circular conv sequence length",
            ));
        }

        let xs = xs.transpose(1, 2)?.contiguous()?;
        let xs = if self.pad > 0 {
            let head = xs.narrow(2, 0, self.pad)?;
            let tail = xs.narrow(2, seq_len - self.pad, self.pad)?;
            Tensor::cat(&[&tail, &xs, &head], 2)?
        } else {
            xs
        };
        Ok(self.conv.forward(&xs)?.transpose(1, 2)?)
    }
}

/// Kernel-1, no-bias convolution, i.e. a per-position channel projection.
#[derive(Debug, Clone)]
pub struct PointwiseConv1d {
    conv: Conv1d,
}

impl PointwiseConv1d {
    pub fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        let conv =
            candle_nn::conv1d_no_bias(in_channels, out_channels, 1, Conv1dConfig::default(), vb)?;
        Ok(Self { conv })
    }
}

impl Module for PointwiseConv1d {
    /// Channels-first: `[B, C_in, L] -> [B, C_out, L]`.
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.conv.forward(xs)
    }
}
