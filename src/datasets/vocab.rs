use std::collections::HashMap;

use tokio::io;

use crate::utils::files;

/// The token standing in for out-of-vocabulary words
pub static UNK: &str = "$UNK$";

/// The token every digit string is folded into
pub static NUM: &str = "$NUM$";

/// The outside tag for tokens that belong to no entity
pub static OUTSIDE: &str = "O";

/// A finite bijection between string tokens and dense integer ids, immutable
/// after load. Ids are assigned by line index in the vocabulary file.
#[derive(Clone, Debug)]
pub struct Vocab {
    token_to_id: HashMap<String, usize>,
    id_to_token: Vec<String>,
}

impl Vocab {
    /// Build a vocabulary from an ordered token list
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id_to_token: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id))
            .collect();

        Self {
            token_to_id,
            id_to_token,
        }
    }

    /// Load a vocabulary from a line-oriented file, one token per line
    pub async fn load(path: &str) -> io::Result<Self> {
        let lines = files::read_file(path).await?;

        Ok(Self::from_tokens(
            lines.into_iter().map(|line| line.trim().to_string()),
        ))
    }

    /// Look up the id for an exact token
    pub fn id(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    /// Look up the token for an id
    pub fn token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(String::as_str)
    }

    /// Resolve a raw word to an id: lowercase, fold digit strings into
    /// [`NUM`], and fall back to [`UNK`] for out-of-vocabulary words
    pub fn resolve_word(&self, word: &str) -> Option<usize> {
        let normalized = word.to_lowercase();
        let normalized = if normalized.chars().all(|c| c.is_ascii_digit()) && !normalized.is_empty()
        {
            NUM.to_string()
        } else {
            normalized
        };

        self.id(&normalized).or_else(|| self.id(UNK))
    }

    /// Resolve a word's characters to ids, skipping characters outside the
    /// vocabulary
    pub fn resolve_chars(&self, word: &str) -> Vec<usize> {
        word.chars()
            .filter_map(|c| self.id(&c.to_string()))
            .collect()
    }

    /// The number of tokens in the vocabulary
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// Whether the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ids_follow_line_order() {
        let vocab = Vocab::from_tokens(["the", "of", "york"]);

        assert_eq!(vocab.id("of"), Some(1));
        assert_eq!(vocab.token(2), Some("york"));
        assert_eq!(vocab.id("missing"), None);
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn resolve_word_lowercases_and_folds_digits() {
        let vocab = Vocab::from_tokens([UNK, NUM, "york"]);

        assert_eq!(vocab.resolve_word("York"), Some(2));
        assert_eq!(vocab.resolve_word("1984"), Some(1));
        assert_eq!(vocab.resolve_word("zweihander"), Some(0));
    }

    #[test]
    fn resolve_chars_skips_unknown_characters() {
        let vocab = Vocab::from_tokens(["a", "b", "c"]);

        assert_eq!(vocab.resolve_chars("cab!"), vec![2, 0, 1]);
    }
}
