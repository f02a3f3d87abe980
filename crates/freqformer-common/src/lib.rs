//! Common types shared by the freqformer crates
//!
//! This crate provides the configuration structs, the error taxonomy and the
//! activation selector used by the operator and model crates.

pub mod activation;
pub mod config;
pub mod error;

pub use activation::Activation;
pub use config::*;
pub use error::*;
