use derive_new::new;
use serde::{Deserialize, Serialize};

/// One sentence with ids resolved against the vocabularies. Tags are empty
/// for unlabeled sentences submitted for inference.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct Item {
    /// Word ids, one per token
    pub words: Vec<usize>,

    /// Character ids per token, present when the pipeline runs in char mode
    pub chars: Option<Vec<Vec<usize>>>,

    /// Gold tag ids, parallel to `words`
    pub tags: Vec<usize>,
}
