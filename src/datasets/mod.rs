/// Vocabulary files
pub mod vocab;

/// CoNLL-formatted corpora
pub mod conll;

/// Pretrained word embeddings
pub mod embeddings;

pub use embeddings::Embeddings;
pub use vocab::Vocab;
