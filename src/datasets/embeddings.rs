use crate::utils::files;

/// A dense pretrained embedding matrix, row i holding the vector for word id
/// i. Produced externally by trimming a larger embedding source down to the
/// vocabulary.
#[derive(Clone, Debug)]
pub struct Embeddings {
    /// Row-major matrix values, `n_words * dim` entries
    pub values: Vec<f32>,

    /// The number of rows, equal to the word vocabulary size
    pub n_words: usize,

    /// The embedding dimensionality
    pub dim: usize,
}

impl Embeddings {
    /// Build a matrix from per-word rows, checking that they are rectangular
    pub fn from_rows(rows: Vec<Vec<f32>>) -> anyhow::Result<Self> {
        let n_words = rows.len();
        let dim = rows.first().map(Vec::len).unwrap_or(0);

        let mut values = Vec::with_capacity(n_words * dim);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(anyhow!(
                    "embedding row {index} has {} values, expected {dim}",
                    row.len()
                ));
            }
            values.extend(row);
        }

        Ok(Self {
            values,
            n_words,
            dim,
        })
    }

    /// Load a trimmed embedding file: one whitespace-separated row of floats
    /// per word id, aligned with the word vocabulary
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let lines = files::read_file(path).await?;

        let rows = lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_whitespace()
                    .map(|value| {
                        value
                            .parse::<f32>()
                            .map_err(|e| anyhow!("bad embedding value {value}: {e}"))
                    })
                    .collect::<anyhow::Result<Vec<f32>>>()
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::from_rows(rows)
    }

    /// The vector for one word id
    pub fn row(&self, id: usize) -> Option<&[f32]> {
        (id < self.n_words).then(|| &self.values[id * self.dim..(id + 1) * self.dim])
    }
}
