use burn::tensor::{backend::Backend, Data, ElementConversion, Int, Shape, Tensor};
use derive_new::new;

use crate::utils::tensors;

use super::{Item, TaggerConfig};

/// Pad every sequence up to the batch's maximum length, never truncating.
/// Returns the rectangular grid and each sequence's true length.
pub fn pad_sequences(sequences: &[Vec<usize>], pad: usize) -> (Vec<Vec<usize>>, Vec<usize>) {
    let max_length = sequences.iter().map(Vec::len).max().unwrap_or(0);

    let lengths = sequences.iter().map(Vec::len).collect();
    let padded = sequences
        .iter()
        .map(|sequence| {
            let mut row = sequence.clone();
            row.resize(max_length, pad);
            row
        })
        .collect();

    (padded, lengths)
}

/// Two-level padding for character ids: first every word is padded to the
/// batch's maximum word length, then every sentence is padded to the maximum
/// sentence length with pad-filled placeholder words of that same width.
/// Returns the rectangular grid and each word's true character count, padded
/// with zeros to the sentence grid width.
#[allow(clippy::type_complexity)]
pub fn pad_char_sequences(
    sentences: &[Vec<Vec<usize>>],
    pad: usize,
) -> (Vec<Vec<Vec<usize>>>, Vec<Vec<usize>>) {
    let max_sentence = sentences.iter().map(Vec::len).max().unwrap_or(0);
    let max_word = sentences
        .iter()
        .flat_map(|sentence| sentence.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    let mut padded = Vec::with_capacity(sentences.len());
    let mut lengths = Vec::with_capacity(sentences.len());

    for sentence in sentences {
        let mut rows = Vec::with_capacity(max_sentence);
        let mut row_lengths = Vec::with_capacity(max_sentence);

        for word in sentence {
            let mut chars = word.clone();
            chars.resize(max_word, pad);
            rows.push(chars);
            row_lengths.push(word.len());
        }

        rows.resize(max_sentence, vec![pad; max_word]);
        row_lengths.resize(max_sentence, 0);

        padded.push(rows);
        lengths.push(row_lengths);
    }

    (padded, lengths)
}

/// A padded batch ready for the model. Tensors are rectangular; the true
/// lengths stay on the CPU for masking, gathering, and decoding.
#[derive(Clone, Debug, new)]
pub struct Batch<B: Backend> {
    /// Word ids, [batch, max_sentence_length]
    pub word_ids: Tensor<B, 2, Int>,

    /// Character ids, [batch, max_sentence_length, max_word_length], present
    /// in char mode
    pub char_ids: Option<Tensor<B, 3, Int>>,

    /// True sentence lengths, one per row
    pub sequence_lengths: Vec<usize>,

    /// True character counts per word, padded with zeros to the sentence grid
    /// width; empty when char mode is off
    pub word_lengths: Vec<Vec<usize>>,

    /// Gold tag ids padded like `word_ids`, absent for inference batches
    pub targets: Option<Tensor<B, 2, Int>>,
}

impl<B: Backend> Batch<B> {
    /// Whether the batch holds no sentences
    pub fn is_empty(&self) -> bool {
        self.sequence_lengths.is_empty()
    }
}

/// Collects items into padded batches for a given model configuration
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    pad_token: usize,
    use_chars: bool,
    device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(config: &TaggerConfig, device: B::Device) -> Self {
        Self {
            pad_token: 0,
            use_chars: config.use_chars,
            device,
        }
    }

    /// Collects a slice of items into a padded batch. Labeled and unlabeled
    /// items cannot be mixed, and a label sequence whose length differs from
    /// its sentence is a fatal error rather than something to pad or clip.
    pub fn batch(&self, items: &[Item]) -> anyhow::Result<Batch<B>> {
        for item in items {
            if !item.tags.is_empty() && item.tags.len() != item.words.len() {
                return Err(anyhow!(
                    "sentence has {} tokens but {} labels",
                    item.words.len(),
                    item.tags.len()
                ));
            }

            if self.use_chars && item.chars.is_none() {
                return Err(anyhow!(
                    "char-level mode is enabled but an item carries no character ids"
                ));
            }
        }

        let sentences: Vec<Vec<usize>> = items.iter().map(|item| item.words.clone()).collect();
        let (padded, sequence_lengths) = pad_sequences(&sentences, self.pad_token);
        let max_length = padded.first().map(Vec::len).unwrap_or(0);
        let word_ids = tensors::pad_to::<B>(self.pad_token, padded, max_length, &self.device);

        let (char_ids, word_lengths) = if self.use_chars {
            let chars: Vec<Vec<Vec<usize>>> = items
                .iter()
                .map(|item| item.chars.clone().unwrap_or_default())
                .collect();
            let (padded_chars, word_lengths) = pad_char_sequences(&chars, self.pad_token);

            (
                Some(self.char_tensor(&padded_chars)),
                word_lengths,
            )
        } else {
            (None, Vec::new())
        };

        let labeled = items.iter().filter(|item| !item.tags.is_empty()).count();
        let targets = match labeled {
            0 => None,
            n if n == items.len() => {
                let tags: Vec<Vec<usize>> = items.iter().map(|item| item.tags.clone()).collect();
                let (padded_tags, _) = pad_sequences(&tags, self.pad_token);
                Some(tensors::pad_to::<B>(
                    self.pad_token,
                    padded_tags,
                    max_length,
                    &self.device,
                ))
            }
            _ => {
                return Err(anyhow!(
                    "cannot batch labeled and unlabeled sentences together"
                ))
            }
        };

        Ok(Batch::new(
            word_ids,
            char_ids,
            sequence_lengths,
            word_lengths,
            targets,
        ))
    }

    fn char_tensor(&self, padded: &[Vec<Vec<usize>>]) -> Tensor<B, 3, Int> {
        let batch_size = padded.len();
        let max_sentence = padded.first().map(Vec::len).unwrap_or(0);
        let max_word = padded
            .first()
            .and_then(|sentence| sentence.first())
            .map(Vec::len)
            .unwrap_or(0);

        let values = padded
            .iter()
            .flatten()
            .flatten()
            .map(|&id| (id as i64).elem())
            .collect();

        Tensor::from_data(
            Data::new(values, Shape::new([batch_size, max_sentence, max_word])),
            &self.device,
        )
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type B = NdArray;

    fn config() -> TaggerConfig {
        TaggerConfig::new(10, 5, 3)
    }

    #[test]
    fn pad_sequences_round_trips_the_valid_prefix() {
        let sentences = vec![vec![4, 5, 6], vec![7], vec![8, 9]];

        let (padded, lengths) = pad_sequences(&sentences, 0);

        assert_eq!(lengths, vec![3, 1, 2]);
        assert_eq!(padded.len(), sentences.len());
        for (row, original) in padded.iter().zip(&sentences) {
            assert_eq!(row.len(), 3);
            assert_eq!(&row[..original.len()], original.as_slice());
        }
    }

    #[test]
    fn pad_sequences_handles_an_empty_batch() {
        let (padded, lengths) = pad_sequences(&[], 0);

        assert_eq!(padded, Vec::<Vec<usize>>::new());
        assert_eq!(lengths, Vec::<usize>::new());
    }

    #[test]
    fn pad_char_sequences_pads_at_both_levels() {
        let sentences = vec![
            vec![vec![1, 2, 3], vec![4]],
            vec![vec![5, 6], vec![7], vec![8]],
        ];

        let (padded, lengths) = pad_char_sequences(&sentences, 0);

        assert_eq!(
            padded,
            vec![
                vec![vec![1, 2, 3], vec![4, 0, 0], vec![0, 0, 0]],
                vec![vec![5, 6, 0], vec![7, 0, 0], vec![8, 0, 0]],
            ]
        );
        assert_eq!(lengths, vec![vec![3, 1, 0], vec![2, 1, 1]]);
    }

    #[test]
    fn pad_char_sequences_replaces_empty_sentences_with_placeholders() {
        let sentences = vec![vec![vec![1, 2]], vec![]];

        let (padded, lengths) = pad_char_sequences(&sentences, 0);

        assert_eq!(padded[1], vec![vec![0, 0]]);
        assert_eq!(lengths[1], vec![0]);
    }

    #[test]
    fn batch_builds_padded_tensors_and_lengths() {
        let batcher = Batcher::<B>::new(&config().with_use_chars(false), Default::default());
        let items = vec![
            Item::new(vec![1, 2, 3], None, vec![0, 1, 2]),
            Item::new(vec![4], None, vec![1]),
        ];

        let batch = batcher.batch(&items).unwrap();

        assert_eq!(batch.word_ids.dims(), [2, 3]);
        assert_eq!(batch.sequence_lengths, vec![3, 1]);

        let words: Vec<i64> = batch.word_ids.into_data().convert::<i64>().value;
        assert_eq!(words, vec![1, 2, 3, 4, 0, 0]);

        let targets: Vec<i64> = batch.targets.unwrap().into_data().convert::<i64>().value;
        assert_eq!(targets, vec![0, 1, 2, 1, 0, 0]);
    }

    #[test]
    fn batch_includes_char_tensors_in_char_mode() {
        let batcher = Batcher::<B>::new(&config(), Default::default());
        let items = vec![Item::new(
            vec![1, 2],
            Some(vec![vec![1, 2, 3], vec![4]]),
            vec![0, 1],
        )];

        let batch = batcher.batch(&items).unwrap();

        let chars = batch.char_ids.unwrap();
        assert_eq!(chars.dims(), [1, 2, 3]);
        assert_eq!(batch.word_lengths, vec![vec![3, 1]]);
    }

    #[test]
    fn batch_rejects_label_length_mismatch() {
        let batcher = Batcher::<B>::new(&config().with_use_chars(false), Default::default());
        let items = vec![Item::new(vec![1, 2, 3], None, vec![0, 1])];

        assert!(batcher.batch(&items).is_err());
    }

    #[test]
    fn batch_rejects_missing_chars_in_char_mode() {
        let batcher = Batcher::<B>::new(&config(), Default::default());
        let items = vec![Item::new(vec![1], None, vec![0])];

        assert!(batcher.batch(&items).is_err());
    }
}
