//! Configuration types and utilities

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Activation, FreqformerError, Result};

/// Hyperparameters of a single decoder layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderLayerConfig {
    pub d_model: usize,
    pub c_out: usize,
    /// Feed-forward hidden width, `4 * d_model` when unset.
    pub d_ff: Option<usize>,
    /// Fraction of the spectrum treated as trend by each decomposition.
    pub series_decomp: f64,
    pub dropout: f32,
    pub activation: String,
    pub use_apdc: bool,
    pub layer_norm_eps: f64,
}

impl Default for DecoderLayerConfig {
    fn default() -> Self {
        Self {
            d_model: 512,
            c_out: 7,
            d_ff: None,
            series_decomp: 0.1,
            dropout: 0.1,
            activation: "relu".to_string(),
            use_apdc: true,
            layer_norm_eps: 1e-5,
        }
    }
}

impl DecoderLayerConfig {
    pub fn new(d_model: usize, c_out: usize) -> Self {
        Self { d_model, c_out, ..Self::default() }
    }

    pub fn with_d_ff(mut self, d_ff: usize) -> Self {
        self.d_ff = Some(d_ff);
        self
    }

    pub fn with_series_decomp(mut self, ratio: f64) -> Self {
        self.series_decomp = ratio;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_activation(mut self, activation: impl Into<String>) -> Self {
        self.activation = activation.into();
        self
    }

    pub fn with_apdc(mut self, use_apdc: bool) -> Self {
        self.use_apdc = use_apdc;
        self
    }

    pub fn resolved_d_ff(&self) -> usize {
        self.d_ff.unwrap_or(4 * self.d_model)
    }

    /// Parse the configured activation name.
    pub fn activation(&self) -> Result<Activation> {
        self.activation.parse()
    }

    pub fn validate(&self) -> Result<()> {
        if self.d_model == 0 {
            return Err(FreqformerError::config("d_model must be greater than zero"));
        }
        if self.c_out == 0 {
            return Err(FreqformerError::config("c_out must be greater than zero"));
        }
        if self.resolved_d_ff() == 0 {
            return Err(FreqformerError::config("d_ff must be greater than zero"));
        }
        validate_dropout(self.dropout)?;
        if !(self.series_decomp > 0.0 && self.series_decomp <= 1.0) {
            return Err(FreqformerError::Config(format!(
                "series_decomp must be in (0, 1], got {}",
                self.series_decomp
            )));
        }
        if !(self.layer_norm_eps.is_finite() && self.layer_norm_eps > 0.0) {
            return Err(FreqformerError::Config(format!(
                "layer_norm_eps must be positive, got {}",
                self.layer_norm_eps
            )));
        }
        self.activation()?;
        Ok(())
    }
}

/// Multi-head attention hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub dropout: f32,
    /// Return the attention weights alongside the output.
    pub output_attention: bool,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self { d_model: 512, n_heads: 8, dropout: 0.1, output_attention: false }
    }
}

impl AttentionConfig {
    pub fn new(d_model: usize, n_heads: usize) -> Self {
        Self { d_model, n_heads, ..Self::default() }
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_output_attention(mut self, output_attention: bool) -> Self {
        self.output_attention = output_attention;
        self
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_heads
    }

    pub fn validate(&self) -> Result<()> {
        if self.d_model == 0 || self.n_heads == 0 {
            return Err(FreqformerError::config("attention d_model and n_heads must be non-zero"));
        }
        if self.d_model % self.n_heads != 0 {
            return Err(FreqformerError::Config(format!(
                "d_model {} is not divisible by n_heads {}",
                self.d_model, self.n_heads
            )));
        }
        validate_dropout(self.dropout)
    }
}

/// Description of a complete decoder stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub layer: DecoderLayerConfig,
    pub n_heads: usize,
    pub num_layers: usize,
    /// Apply a seasonal layer norm to the final seasonal state.
    pub final_norm: bool,
    /// Project the final seasonal state from `d_model` to `c_out`.
    pub projection: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            layer: DecoderLayerConfig::default(),
            n_heads: 8,
            num_layers: 1,
            final_norm: true,
            projection: true,
        }
    }
}

impl DecoderConfig {
    pub fn new(layer: DecoderLayerConfig, n_heads: usize, num_layers: usize) -> Self {
        Self { layer, n_heads, num_layers, ..Self::default() }
    }

    pub fn attention(&self) -> AttentionConfig {
        AttentionConfig::new(self.layer.d_model, self.n_heads).with_dropout(self.layer.dropout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_layers == 0 {
            return Err(FreqformerError::config("decoder needs at least one layer"));
        }
        self.layer.validate()?;
        self.attention().validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading decoder config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

fn validate_dropout(p: f32) -> Result<()> {
    if !(0.0..1.0).contains(&p) {
        return Err(FreqformerError::Config(format!("dropout must be in [0, 1), got {p}")));
    }
    Ok(())
}
