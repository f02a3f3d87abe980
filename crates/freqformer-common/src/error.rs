//! Error types for model construction and forward passes

use thiserror::Error;

/// Errors produced while building or running freqformer modules.
///
/// Construction-time problems surface as [`FreqformerError::Config`];
/// incompatible tensors at forward time surface as
/// [`FreqformerError::ShapeMismatch`]. Nothing is retried: every failure is
/// deterministic for a given configuration and input.
#[derive(Error, Debug)]
pub enum FreqformerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize>, context: String },

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FreqformerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn shape_mismatch(expected: &[usize], got: &[usize], context: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
            context: context.into(),
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FreqformerError>;
