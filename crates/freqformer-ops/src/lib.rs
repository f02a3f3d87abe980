//! Numeric operators used by the seasonal/trend decoder
//!
//! Everything here works on `[batch, seq_len, channels]` tensors and owns its
//! parameters through a [`candle_nn::VarBuilder`], so each instance has its
//! own named variables.

pub mod conv;
pub mod decomp;
pub mod denoise;
pub mod norm;
pub mod spectral;

pub use conv::{CircularConv1d, PointwiseConv1d};
pub use decomp::{FourierDecomp, MovingAvgDecomp, SeriesDecomposition};
pub use denoise::{AdaptiveFreqDenoise, Denoise};
pub use norm::SeasonalLayerNorm;
pub use spectral::{SpectralBasis, SpectralCache};
