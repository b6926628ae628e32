use burn::data::dataset::{self, InMemDataset};

use crate::{pipelines::sequence_labeling::Item, utils::files};

use super::Vocab;

/// A CoNLL-formatted corpus: one `word tag` pair per line, sentences
/// separated by blank lines, `-DOCSTART-` markers skipped
pub struct Dataset {
    /// Underlying In-Memory dataset
    dataset: InMemDataset<Item>,
}

/// Implement the Dataset trait for CoNLL corpora
impl dataset::Dataset<Item> for Dataset {
    /// Returns a specific item from the dataset
    fn get(&self, index: usize) -> Option<Item> {
        self.dataset.get(index)
    }

    /// Returns the length of the dataset
    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl Dataset {
    /// Wrap already-resolved items, mostly for tests and synthetic data
    pub fn from_items(items: Vec<Item>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Read a corpus file and resolve every token against the vocabularies.
    /// Pass a character vocabulary to produce per-token character ids.
    pub async fn load(
        path: &str,
        words: &Vocab,
        tags: &Vocab,
        chars: Option<&Vocab>,
    ) -> anyhow::Result<Self> {
        let lines = files::read_file(path).await?;

        let mut items = Vec::new();
        let mut sentence = Sentence::default();

        for line in lines {
            let line = line.trim();

            if line.is_empty() {
                if let Some(item) = sentence.take(chars.is_some()) {
                    items.push(item);
                }
                continue;
            }

            if line.starts_with("-DOCSTART-") {
                continue;
            }

            let mut columns = line.split_whitespace();
            let word = columns
                .next()
                .ok_or_else(|| anyhow!("malformed corpus line: {line}"))?;
            let tag = columns
                .last()
                .ok_or_else(|| anyhow!("missing tag column in corpus line: {line}"))?;

            let word_id = words
                .resolve_word(word)
                .ok_or_else(|| anyhow!("word {word} is not covered by the vocabulary"))?;
            let tag_id = tags
                .id(tag)
                .ok_or_else(|| anyhow!("unknown tag {tag} in corpus line: {line}"))?;

            sentence.words.push(word_id);
            sentence.tags.push(tag_id);

            if let Some(chars) = chars {
                sentence.chars.push(chars.resolve_chars(word));
            }
        }

        if let Some(item) = sentence.take(chars.is_some()) {
            items.push(item);
        }

        Ok(Self::from_items(items))
    }
}

#[derive(Default)]
struct Sentence {
    words: Vec<usize>,
    chars: Vec<Vec<usize>>,
    tags: Vec<usize>,
}

impl Sentence {
    fn take(&mut self, with_chars: bool) -> Option<Item> {
        if self.words.is_empty() {
            return None;
        }

        let words = std::mem::take(&mut self.words);
        let chars = std::mem::take(&mut self.chars);
        let tags = std::mem::take(&mut self.tags);

        Some(Item::new(words, with_chars.then_some(chars), tags))
    }
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::Dataset as _;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn from_items_exposes_items_in_order() {
        let items = vec![
            Item::new(vec![0, 1], None, vec![0, 0]),
            Item::new(vec![2], None, vec![1]),
        ];

        let dataset = Dataset::from_items(items);

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().words, vec![2]);
        assert!(dataset.get(2).is_none());
    }
}
