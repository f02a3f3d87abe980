//! Seasonal/trend decomposition decoder
//!
//! A [`Decoder`] drives a stack of [`DecoderLayer`]s. Each layer refines the
//! seasonal state through self-attention, cross-attention and a pointwise
//! feed-forward block, extracting a trend component after every sub-block.
//! The per-layer trends are projected to the output width and summed into a
//! running trend forecast.

pub mod attention;
pub mod decoder;
pub mod layer;

pub use attention::{causal_mask, AttentionModule, MultiHeadAttention};
pub use decoder::{Decoder, SeasonalHead};
pub use layer::{DecoderLayer, DenoiseStage};
