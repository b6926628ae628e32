//! Sequence labeling: assign one categorical tag to every token of a
//! sentence, with either independent per-token classification or a
//! linear-chain CRF output layer.

/// The unique string token that identifies this pipeline
pub static PIPELINE: &str = "sequence-labeling";

/// Batcher
pub mod batcher;

/// Linear-chain CRF
pub mod crf;

/// Bidirectional recurrent encoders
pub mod encoder;

/// Evaluation
pub mod evaluation;

/// Inference
pub mod inference;

/// Sequence Labeling Items
pub mod item;

/// The tagging model
pub mod model;

/// Training
pub mod training;

pub use batcher::{Batch, Batcher};
pub use item::Item;
pub use model::{Tagger, TaggerConfig};
