//! # Sequence Tagger
//!
//! Neural sequence labeling for Named Entity Recognition: a character-aware
//! bidirectional LSTM tagger with either independent per-token softmax
//! classification or a linear-chain CRF output layer, built on Burn.
#![forbid(unsafe_code)]

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Utilities
pub mod utils;

/// Error macros
#[macro_use]
extern crate anyhow;
