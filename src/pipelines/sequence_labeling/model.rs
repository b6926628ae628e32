use burn::{
    config::Config,
    module::{Module, Param},
    nn::{
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, EmbeddingRecord, Linear, LinearConfig,
    },
    record::{CompactRecorder, Recorder},
    tensor::{
        activation::log_softmax,
        backend::Backend,
        Data, ElementConversion, Int, Shape, Tensor,
    },
};
use derive_new::new;

use crate::{datasets::Embeddings, utils::tensors};

use super::{
    batcher::Batch,
    crf::{Crf, CrfConfig},
    encoder::{BiLstm, BiLstmConfig, CharEncoder, CharEncoderConfig},
};

/// File stem of the model checkpoint inside an artifact directory
pub static CHECKPOINT: &str = "model";

/// Configuration for a [`Tagger`]
#[derive(Config)]
pub struct TaggerConfig {
    /// The word vocabulary size
    pub n_words: usize,

    /// The character vocabulary size
    pub n_chars: usize,

    /// The number of tags
    pub n_tags: usize,

    /// Word embedding dimensionality
    #[config(default = 300)]
    pub dim_word: usize,

    /// Character embedding dimensionality
    #[config(default = 100)]
    pub dim_char: usize,

    /// Hidden size of each direction of the word-level LSTM
    #[config(default = 300)]
    pub hidden_size_lstm: usize,

    /// Hidden size of each direction of the character-level LSTM
    #[config(default = 100)]
    pub hidden_size_char: usize,

    /// Enable the character-level representation component
    #[config(default = true)]
    pub use_chars: bool,

    /// Use the linear-chain CRF output layer instead of independent
    /// per-token classification
    #[config(default = true)]
    pub use_crf: bool,

    /// Dropout keep-probability; dropout is a no-op on the inference backend
    #[config(default = 0.5)]
    pub dropout_keep: f64,

    /// Whether the word embedding table is updated by optimization
    #[config(default = false)]
    pub train_embeddings: bool,
}

impl TaggerConfig {
    /// Initialize the model with randomly initialized word embeddings
    pub fn init<B: Backend>(&self, device: &B::Device) -> Tagger<B> {
        self.build(None, device)
    }

    /// Initialize the model with a pretrained word embedding matrix
    pub fn init_with_embeddings<B: Backend>(
        &self,
        embeddings: &Embeddings,
        device: &B::Device,
    ) -> anyhow::Result<Tagger<B>> {
        if embeddings.n_words != self.n_words || embeddings.dim != self.dim_word {
            return Err(anyhow!(
                "embedding matrix is {}x{} but the model expects {}x{}",
                embeddings.n_words,
                embeddings.dim,
                self.n_words,
                self.dim_word
            ));
        }

        let weight = Tensor::from_data(
            Data::new(
                embeddings.values.iter().map(|&v| v.elem()).collect(),
                Shape::new([self.n_words, self.dim_word]),
            ),
            device,
        );

        Ok(self.build(Some(weight), device))
    }

    fn build<B: Backend>(&self, pretrained: Option<Tensor<B, 2>>, device: &B::Device) -> Tagger<B> {
        let mut word_embedding = EmbeddingConfig::new(self.n_words, self.dim_word).init(device);
        if let Some(weight) = pretrained {
            word_embedding = word_embedding.load_record(EmbeddingRecord {
                weight: Param::from_tensor(weight),
            });
        }
        if !self.train_embeddings {
            word_embedding = word_embedding.no_grad();
        }

        let char_encoder = self.use_chars.then(|| {
            CharEncoderConfig::new(self.n_chars, self.dim_char, self.hidden_size_char).init(device)
        });

        let d_repr = self.dim_word + if self.use_chars {
            2 * self.hidden_size_char
        } else {
            0
        };

        Tagger {
            word_embedding,
            char_encoder,
            dropout: DropoutConfig::new(1.0 - self.dropout_keep).init(),
            context: BiLstmConfig::new(d_repr, self.hidden_size_lstm).init(device),
            projection: LinearConfig::new(2 * self.hidden_size_lstm, self.n_tags).init(device),
            crf: self.use_crf.then(|| CrfConfig::new(self.n_tags).init(device)),
        }
    }
}

/// The sequence tagging model: word embeddings, an optional character-level
/// encoder, a bidirectional contextual LSTM, a linear projection to per-tag
/// scores, and either independent classification or a CRF on top. The output
/// mode is fixed at build time; the transition matrix exists only in CRF
/// mode.
#[derive(Module, Debug)]
pub struct Tagger<B: Backend> {
    word_embedding: Embedding<B>,
    char_encoder: Option<CharEncoder<B>>,
    dropout: Dropout,
    context: BiLstm<B>,
    projection: Linear<B>,
    crf: Option<Crf<B>>,
}

/// The result of a training forward pass
#[derive(Debug, new)]
pub struct Output<B: Backend> {
    /// The loss
    pub loss: Tensor<B, 1>,

    /// Per-token, per-tag scores, [batch, seq, n_tags]
    pub logits: Tensor<B, 3>,

    /// The gold tags, [batch, seq]
    pub targets: Tensor<B, 2, Int>,
}

impl<B: Backend> Tagger<B> {
    /// Per-token, per-tag scores for a batch: [batch, seq, n_tags]
    pub fn logits(&self, batch: &Batch<B>) -> anyhow::Result<Tensor<B, 3>> {
        let embedded = self.word_embedding.forward(batch.word_ids.clone());

        let representation = match &self.char_encoder {
            Some(char_encoder) => {
                let char_ids = batch.char_ids.clone().ok_or_else(|| {
                    anyhow!("char-level mode is enabled but the batch carries no character ids")
                })?;
                let char_repr = char_encoder.forward(char_ids, &batch.word_lengths);

                Tensor::cat(vec![embedded, char_repr], 2)
            }
            None => embedded,
        };

        let representation = self.dropout.forward(representation);
        let context = self
            .context
            .forward_sequence(representation, &batch.sequence_lengths);
        let context = self.dropout.forward(context);

        Ok(self.projection.forward(context))
    }

    /// Defines forward pass for training
    pub fn forward(&self, batch: &Batch<B>) -> anyhow::Result<Output<B>> {
        let logits = self.logits(batch)?;
        let targets = batch
            .targets
            .clone()
            .ok_or_else(|| anyhow!("cannot compute a loss for a batch without labels"))?;

        let loss = match &self.crf {
            Some(crf) => crf.negative_log_likelihood(
                logits.clone(),
                targets.clone(),
                &batch.sequence_lengths,
            ),
            None => masked_cross_entropy(logits.clone(), targets.clone(), &batch.sequence_lengths),
        };

        Ok(Output::new(loss, logits, targets))
    }

    /// Predict one tag sequence per sentence, truncated to true lengths
    pub fn predict(&self, batch: &Batch<B>) -> anyhow::Result<Vec<Vec<usize>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let logits = self.logits(batch)?;

        match &self.crf {
            Some(crf) => Ok(crf
                .decode(logits, &batch.sequence_lengths)
                .into_iter()
                .map(|(sequence, _score)| sequence)
                .collect()),
            None => {
                let [batch_size, seq_length, _] = logits.dims();
                let predicted: Vec<i64> = logits
                    .argmax(2)
                    .reshape([batch_size, seq_length])
                    .into_data()
                    .convert::<i64>()
                    .value;

                Ok(batch
                    .sequence_lengths
                    .iter()
                    .enumerate()
                    .map(|(row, &len)| {
                        predicted[row * seq_length..row * seq_length + len]
                            .iter()
                            .map(|&tag| tag as usize)
                            .collect()
                    })
                    .collect())
            }
        }
    }
}

/// Mean per-token cross-entropy over valid (non-padded) positions only
fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    lengths: &[usize],
) -> Tensor<B, 1> {
    let [_batch_size, seq_length, _n_tags] = logits.dims();
    let device = logits.device();

    let log_probs = log_softmax(logits, 2);
    let gold = log_probs
        .gather(2, targets.unsqueeze_dim::<3>(2))
        .squeeze::<2>(2);

    let mask = tensors::sequence_mask::<B>(lengths, seq_length, &device);

    (gold * mask.clone()).sum().div(mask.sum()).neg()
}

/// Persist the model into an artifact directory, staging the record under a
/// temporary name and renaming once fully written so a torn write never
/// leaves a checkpoint that looks valid.
pub fn save_checkpoint<B: Backend>(model: &Tagger<B>, artifact_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(artifact_dir)?;

    let staged = format!("{artifact_dir}/{CHECKPOINT}-staged");
    CompactRecorder::new()
        .record(model.clone().into_record(), staged.clone().into())
        .map_err(|e| anyhow!("unable to write checkpoint: {}", e))?;

    // the recorder appends its own file extension
    std::fs::rename(
        format!("{staged}.mpk"),
        format!("{artifact_dir}/{CHECKPOINT}.mpk"),
    )?;

    Ok(())
}

/// Restore model parameters from an artifact directory. A missing checkpoint
/// is an error: training must have happened first.
pub fn load_checkpoint<B: Backend>(
    model: Tagger<B>,
    artifact_dir: &str,
    device: &B::Device,
) -> anyhow::Result<Tagger<B>> {
    let record = CompactRecorder::new()
        .load(format!("{artifact_dir}/{CHECKPOINT}").into(), device)
        .map_err(|e| anyhow!("unable to load trained model weights: {}", e))?;

    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use crate::pipelines::sequence_labeling::{Batcher, Item};

    use super::*;

    type B = NdArray;

    fn device() -> <B as Backend>::Device {
        Default::default()
    }

    fn tiny_config(use_chars: bool, use_crf: bool) -> TaggerConfig {
        TaggerConfig::new(12, 8, 5)
            .with_dim_word(6)
            .with_dim_char(4)
            .with_hidden_size_lstm(7)
            .with_hidden_size_char(3)
            .with_use_chars(use_chars)
            .with_use_crf(use_crf)
            .with_dropout_keep(1.0)
    }

    fn john_lives_in_new_york() -> Item {
        // "John lives in New York" -> B-PER O O B-LOC I-LOC
        Item::new(
            vec![1, 2, 3, 4, 5],
            Some(vec![vec![1, 2], vec![3], vec![4, 5, 6], vec![7], vec![1, 3]]),
            vec![1, 0, 0, 2, 3],
        )
    }

    #[test]
    fn predictions_align_one_to_one_with_tokens() {
        for use_crf in [false, true] {
            let config = tiny_config(true, use_crf);
            let model = config.init::<B>(&device());
            let batcher = Batcher::<B>::new(&config, device());

            let batch = batcher.batch(&[john_lives_in_new_york()]).unwrap();
            let predicted = model.predict(&batch).unwrap();

            assert_eq!(predicted.len(), 1);
            assert_eq!(predicted[0].len(), 5);
            assert!(predicted[0].iter().all(|&tag| tag < 5));
        }
    }

    #[test]
    fn predictions_do_not_depend_on_pad_content() {
        for use_crf in [false, true] {
            let config = tiny_config(true, use_crf);
            let model = config.init::<B>(&device());
            let batcher = Batcher::<B>::new(&config, device());

            let short = Item::new(
                vec![6, 7],
                Some(vec![vec![2, 4], vec![5]]),
                vec![0, 1],
            );
            let long = john_lives_in_new_york();

            let alone = batcher.batch(&[short.clone()]).unwrap();
            let padded = batcher.batch(&[short, long]).unwrap();

            let alone_tags = model.predict(&alone).unwrap();
            let padded_tags = model.predict(&padded).unwrap();

            assert_eq!(alone_tags[0], padded_tags[0]);
        }
    }

    #[test]
    fn forward_produces_a_finite_loss() {
        for use_crf in [false, true] {
            let config = tiny_config(false, use_crf);
            let model = config.init::<B>(&device());
            let batcher = Batcher::<B>::new(&config, device());

            let items = vec![
                Item::new(vec![1, 2, 3], None, vec![0, 1, 2]),
                Item::new(vec![4], None, vec![3]),
            ];
            let batch = batcher.batch(&items).unwrap();

            let output = model.forward(&batch).unwrap();
            let loss: f32 = output.loss.into_data().convert::<f32>().value[0];

            assert!(loss.is_finite());
        }
    }

    #[test]
    fn pretrained_embeddings_are_loaded_into_the_word_table() {
        let config = tiny_config(false, false).with_dim_word(3);

        let rows: Vec<f32> = (0..12 * 3).map(|v| v as f32 / 10.0).collect();
        let embeddings = Embeddings::from_rows(
            rows.chunks(3).map(|row| row.to_vec()).collect(),
        )
        .unwrap();

        let model = config
            .init_with_embeddings::<B>(&embeddings, &device())
            .unwrap();

        let loaded: Vec<f32> = model
            .word_embedding
            .weight
            .val()
            .into_data()
            .convert::<f32>()
            .value;
        assert_eq!(loaded, rows);

        // a matrix whose shape disagrees with the config is rejected
        let wrong = Embeddings::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        assert!(config.init_with_embeddings::<B>(&wrong, &device()).is_err());
    }

    #[test]
    fn checkpoints_round_trip() {
        let config = tiny_config(false, true);
        let model = config.init::<B>(&device());

        let dir = std::env::temp_dir().join(format!("tagger-ckpt-{}", std::process::id()));
        let dir = dir.to_string_lossy().to_string();

        save_checkpoint(&model, &dir).unwrap();
        let restored = load_checkpoint(config.init::<B>(&device()), &dir, &device()).unwrap();

        let batcher = Batcher::<B>::new(&config, device());
        let batch = batcher
            .batch(&[Item::new(vec![1, 2], None, vec![0, 1])])
            .unwrap();

        assert_eq!(
            model.predict(&batch).unwrap(),
            restored.predict(&batch).unwrap()
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_checkpoint_is_fatal() {
        let config = tiny_config(false, false);
        let model = config.init::<B>(&device());

        let result = load_checkpoint(model, "/nonexistent/artifacts", &device());

        assert!(result.is_err());
    }
}
