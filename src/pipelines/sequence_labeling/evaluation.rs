use std::collections::HashSet;

use burn::{data::dataset::Dataset, tensor::backend::Backend};
use derive_new::new;

use crate::datasets::{vocab, Vocab};

use super::{Batcher, Item, Tagger};

/// Token accuracy and entity-level precision/recall/F1 over a dataset
#[derive(Clone, Debug, Default, PartialEq, new)]
pub struct Metrics {
    /// Fraction of non-padded positions with the correct tag
    pub accuracy: f64,

    /// Correct chunks over predicted chunks
    pub precision: f64,

    /// Correct chunks over gold chunks
    pub recall: f64,

    /// Harmonic mean of precision and recall
    pub f1: f64,
}

/// A maximal contiguous run of tokens forming one entity, with its type and
/// token span (`end` exclusive)
#[derive(Clone, Debug, PartialEq, Eq, Hash, new)]
pub struct Chunk {
    /// The entity type, e.g. PER or LOC
    pub kind: String,

    /// First token position of the chunk
    pub start: usize,

    /// One past the last token position of the chunk
    pub end: usize,
}

/// Extract entity chunks from a tag-id sequence under the begin/inside
/// convention: a chunk starts at a `B-TYPE` tag or at a type change, and
/// continues through `I-TYPE` tags of the same type.
pub fn chunks(tags: &[usize], vocab: &Vocab) -> Vec<Chunk> {
    let mut result = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for (position, &tag) in tags.iter().enumerate() {
        let name = vocab.token(tag).unwrap_or(vocab::OUTSIDE);

        if name == vocab::OUTSIDE {
            if let Some((kind, start)) = current.take() {
                result.push(Chunk::new(kind, start, position));
            }
            continue;
        }

        let (prefix, kind) = name.split_once('-').unwrap_or(("B", name));

        match &current {
            Some((open_kind, _)) if open_kind == kind && prefix != "B" => {}
            _ => {
                if let Some((kind, start)) = current.take() {
                    result.push(Chunk::new(kind, start, position));
                }
                current = Some((kind.to_string(), position));
            }
        }
    }

    if let Some((kind, start)) = current {
        result.push(Chunk::new(kind, start, tags.len()));
    }

    result
}

/// Accumulates token- and chunk-level counts across sentences
#[derive(Debug, Default)]
pub struct Counts {
    correct_tokens: usize,
    total_tokens: usize,
    correct_chunks: usize,
    predicted_chunks: usize,
    gold_chunks: usize,
}

impl Counts {
    /// Fold one sentence's gold and predicted tags into the counts
    pub fn observe(&mut self, gold: &[usize], predicted: &[usize], vocab: &Vocab) {
        self.total_tokens += gold.len();
        self.correct_tokens += gold
            .iter()
            .zip(predicted)
            .filter(|(g, p)| g == p)
            .count();

        let gold_set: HashSet<Chunk> = chunks(gold, vocab).into_iter().collect();
        let predicted_set: HashSet<Chunk> = chunks(predicted, vocab).into_iter().collect();

        self.correct_chunks += gold_set.intersection(&predicted_set).count();
        self.predicted_chunks += predicted_set.len();
        self.gold_chunks += gold_set.len();
    }

    /// Final metrics; precision, recall, and F1 are all zero when no chunk
    /// was predicted correctly
    pub fn metrics(&self) -> Metrics {
        let accuracy = if self.total_tokens > 0 {
            self.correct_tokens as f64 / self.total_tokens as f64
        } else {
            0.0
        };

        if self.correct_chunks == 0 {
            return Metrics::new(accuracy, 0.0, 0.0, 0.0);
        }

        let precision = self.correct_chunks as f64 / self.predicted_chunks as f64;
        let recall = self.correct_chunks as f64 / self.gold_chunks as f64;
        let f1 = 2.0 * precision * recall / (precision + recall);

        Metrics::new(accuracy, precision, recall, f1)
    }
}

/// Evaluate a model over a labeled dataset, minibatch by minibatch
pub fn evaluate<B: Backend, D: Dataset<Item>>(
    model: &Tagger<B>,
    batcher: &Batcher<B>,
    dataset: &D,
    tags: &Vocab,
    batch_size: usize,
) -> anyhow::Result<Metrics> {
    let items: Vec<Item> = dataset.iter().collect();
    let mut counts = Counts::default();

    for chunk in items.chunks(batch_size.max(1)) {
        let batch = batcher.batch(chunk)?;
        let predictions = model.predict(&batch)?;

        for (item, predicted) in chunk.iter().zip(&predictions) {
            counts.observe(&item.tags, predicted, tags);
        }
    }

    Ok(counts.metrics())
}
