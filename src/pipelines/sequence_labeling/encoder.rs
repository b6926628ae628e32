use burn::{
    config::Config,
    module::Module,
    nn::{Embedding, EmbeddingConfig, Lstm, LstmConfig},
    tensor::{backend::Backend, Int, Tensor},
};

use crate::utils::tensors;

/// Configuration for a [`BiLstm`]
#[derive(Config)]
pub struct BiLstmConfig {
    /// The size of each input step
    pub d_input: usize,

    /// The hidden size of each direction
    pub d_hidden: usize,
}

impl BiLstmConfig {
    /// Initialize the encoder
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiLstm<B> {
        BiLstm {
            forward: LstmConfig::new(self.d_input, self.d_hidden, true).init(device),
            backward: LstmConfig::new(self.d_input, self.d_hidden, true).init(device),
        }
    }
}

/// A length-aware bidirectional LSTM. The backward direction runs over each
/// row's length-reversed valid prefix, so padded steps always come after the
/// last valid one and can never leak signal into valid positions.
#[derive(Module, Debug)]
pub struct BiLstm<B: Backend> {
    forward: Lstm<B>,
    backward: Lstm<B>,
}

impl<B: Backend> BiLstm<B> {
    /// Per-position outputs with the two directions concatenated:
    /// [rows, time, 2 * d_hidden]
    pub fn forward_sequence(&self, input: Tensor<B, 3>, lengths: &[usize]) -> Tensor<B, 3> {
        let (_, forward_out) = self.forward.forward(input.clone(), None);

        let reversed = tensors::reverse_padded(input, lengths);
        let (_, backward_reversed) = self.backward.forward(reversed, None);
        let backward_out = tensors::reverse_padded(backward_reversed, lengths);

        Tensor::cat(vec![forward_out, backward_out], 2)
    }

    /// The final hidden state of each direction, taken at each row's true
    /// length, concatenated: [rows, 2 * d_hidden]
    pub fn forward_final(&self, input: Tensor<B, 3>, lengths: &[usize]) -> Tensor<B, 2> {
        let (_, forward_out) = self.forward.forward(input.clone(), None);
        let forward_last = tensors::gather_last(forward_out, lengths);

        let reversed = tensors::reverse_padded(input, lengths);
        let (_, backward_reversed) = self.backward.forward(reversed, None);
        let backward_last = tensors::gather_last(backward_reversed, lengths);

        Tensor::cat(vec![forward_last, backward_last], 1)
    }
}

/// Configuration for a [`CharEncoder`]
#[derive(Config)]
pub struct CharEncoderConfig {
    /// The character vocabulary size
    pub n_chars: usize,

    /// The character embedding dimensionality
    pub dim_char: usize,

    /// The hidden size of each LSTM direction
    pub hidden_size: usize,
}

impl CharEncoderConfig {
    /// Initialize the encoder
    pub fn init<B: Backend>(&self, device: &B::Device) -> CharEncoder<B> {
        CharEncoder {
            embedding: EmbeddingConfig::new(self.n_chars, self.dim_char).init(device),
            lstm: BiLstmConfig::new(self.dim_char, self.hidden_size).init(device),
            hidden_size: self.hidden_size,
        }
    }
}

/// Builds a fixed-size representation for every word of a batch from its
/// character sequence, using the final states of a bidirectional LSTM run
/// over the word's true character count.
#[derive(Module, Debug)]
pub struct CharEncoder<B: Backend> {
    embedding: Embedding<B>,
    lstm: BiLstm<B>,
    hidden_size: usize,
}

impl<B: Backend> CharEncoder<B> {
    /// Encode [batch, seq, word] character ids into per-token vectors of
    /// size 2 * hidden: [batch, seq, 2 * hidden]
    pub fn forward(
        &self,
        char_ids: Tensor<B, 3, Int>,
        word_lengths: &[Vec<usize>],
    ) -> Tensor<B, 3> {
        let [batch_size, seq_length, word_length] = char_ids.dims();

        let flat_lengths: Vec<usize> = word_lengths.iter().flatten().copied().collect();

        let embedded = self
            .embedding
            .forward(char_ids.reshape([batch_size * seq_length, word_length]));

        let final_states = self.lstm.forward_final(embedded, &flat_lengths);

        final_states.reshape([batch_size, seq_length, 2 * self.hidden_size])
    }
}
