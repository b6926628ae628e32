use burn::{
    config::Config,
    module::{Module, Param},
    nn::Initializer,
    tensor::{backend::Backend, Int, Tensor},
};

use crate::utils::tensors;

/// Configuration for a [`Crf`]
#[derive(Config)]
pub struct CrfConfig {
    /// The number of tags
    pub n_tags: usize,
}

impl CrfConfig {
    /// Initialize the module
    pub fn init<B: Backend>(&self, device: &B::Device) -> Crf<B> {
        Crf {
            transitions: Initializer::Normal {
                mean: 0.0,
                std: 0.1,
            }
            .init([self.n_tags, self.n_tags], device),
            n_tags: self.n_tags,
        }
    }
}

/// A linear-chain conditional random field over per-token tag scores, with a
/// learned pairwise tag-transition matrix.
#[derive(Module, Debug)]
pub struct Crf<B: Backend> {
    transitions: Param<Tensor<B, 2>>,
    n_tags: usize,
}

impl<B: Backend> Crf<B> {
    /// Negative mean log-likelihood of the gold tag sequences given per-token
    /// emission scores, restricted to each sentence's true length
    pub fn negative_log_likelihood(
        &self,
        emissions: Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
        lengths: &[usize],
    ) -> Tensor<B, 1> {
        let [batch_size, seq_length, n_tags] = emissions.dims();
        let device = emissions.device();
        let mask = tensors::sequence_mask::<B>(lengths, seq_length, &device);

        // score of the gold path: emissions at gold tags plus transitions
        // between consecutive gold tags, valid positions only
        let gold_emissions = emissions
            .clone()
            .gather(2, targets.clone().unsqueeze_dim::<3>(2))
            .squeeze::<2>(2)
            * mask.clone();
        let mut gold_score = gold_emissions.sum_dim(1).squeeze::<1>(1);

        if seq_length > 1 {
            let from = targets.clone().slice([0..batch_size, 0..seq_length - 1]);
            let to = targets.slice([0..batch_size, 1..seq_length]);
            let indices = (from.mul_scalar(n_tags as i64) + to)
                .reshape([batch_size * (seq_length - 1)]);

            let transition_scores = self
                .transitions
                .val()
                .reshape([n_tags * n_tags])
                .select(0, indices)
                .reshape([batch_size, seq_length - 1]);

            // a transition t -> t+1 counts only when position t+1 is valid
            let transition_mask = mask.clone().slice([0..batch_size, 1..seq_length]);
            gold_score =
                gold_score + (transition_scores * transition_mask).sum_dim(1).squeeze::<1>(1);
        }

        // partition function via the forward algorithm
        let mut alpha = emissions
            .clone()
            .slice([0..batch_size, 0..1, 0..n_tags])
            .squeeze::<2>(1);

        for t in 1..seq_length {
            let emit_t = emissions.clone().slice([0..batch_size, t..t + 1, 0..n_tags]);

            let scores = alpha.clone().unsqueeze_dim::<3>(2)
                + self.transitions.val().unsqueeze::<3>()
                + emit_t;
            let next = log_sum_exp_mid(scores);

            // frozen past each sentence's true length
            let step_mask = mask.clone().slice([0..batch_size, t..t + 1]);
            alpha = next * step_mask.clone() + alpha * (step_mask.neg().add_scalar(1.0));
        }

        let max = alpha.clone().max_dim(1);
        let log_partition = (alpha - max.clone())
            .exp()
            .sum_dim(1)
            .log()
            .add(max)
            .squeeze::<1>(1);

        (log_partition - gold_score).mean()
    }

    /// Viterbi-decode every sentence of a batch, returning each decoded tag
    /// sequence together with its score
    pub fn decode(&self, emissions: Tensor<B, 3>, lengths: &[usize]) -> Vec<(Vec<usize>, f32)> {
        let [_batch_size, seq_length, n_tags] = emissions.dims();

        let emission_values: Vec<f32> = emissions.into_data().convert::<f32>().value;
        let transition_values: Vec<f32> = self.transitions.val().into_data().convert::<f32>().value;

        lengths
            .iter()
            .enumerate()
            .map(|(row, &len)| {
                let start = row * seq_length * n_tags;
                let sentence = &emission_values[start..start + len * n_tags];

                viterbi_decode(sentence, n_tags, &transition_values)
            })
            .collect()
    }
}

/// Log-sum-exp over the middle dimension of [batch, n, n], producing
/// [batch, n]
fn log_sum_exp_mid<B: Backend>(scores: Tensor<B, 3>) -> Tensor<B, 2> {
    let max = scores.clone().max_dim(1);

    (scores - max.clone())
        .exp()
        .sum_dim(1)
        .log()
        .add(max)
        .squeeze::<2>(1)
}

/// Find the maximum-score tag sequence under per-position emission scores
/// (`steps * n_tags` values, row-major) plus pairwise transition scores.
/// Ties keep the first path encountered, so decoding is deterministic.
pub fn viterbi_decode(emissions: &[f32], n_tags: usize, transitions: &[f32]) -> (Vec<usize>, f32) {
    let steps = emissions.len() / n_tags.max(1);
    if steps == 0 || n_tags == 0 {
        return (Vec::new(), 0.0);
    }

    let mut score = emissions[..n_tags].to_vec();
    let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(steps.saturating_sub(1));

    for t in 1..steps {
        let mut next = vec![0.0; n_tags];
        let mut pointers = vec![0; n_tags];

        for to in 0..n_tags {
            let mut best = f32::NEG_INFINITY;
            let mut best_from = 0;

            for (from, &previous) in score.iter().enumerate() {
                let candidate = previous + transitions[from * n_tags + to];
                if candidate > best {
                    best = candidate;
                    best_from = from;
                }
            }

            next[to] = best + emissions[t * n_tags + to];
            pointers[to] = best_from;
        }

        score = next;
        backpointers.push(pointers);
    }

    let mut best_tag = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (tag, &value) in score.iter().enumerate() {
        if value > best_score {
            best_score = value;
            best_tag = tag;
        }
    }

    let mut sequence = vec![best_tag];
    for pointers in backpointers.iter().rev() {
        best_tag = pointers[best_tag];
        sequence.push(best_tag);
    }
    sequence.reverse();

    (sequence, best_score)
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        tensor::{Data, Shape},
    };
    use pretty_assertions::assert_eq;

    use super::*;

    type B = NdArray;

    fn device() -> <B as Backend>::Device {
        Default::default()
    }

    fn crf_with(transitions: Vec<f32>, n_tags: usize) -> Crf<B> {
        let tensor: Tensor<B, 2> = Tensor::from_data(
            Data::new(transitions, Shape::new([n_tags, n_tags])),
            &device(),
        );

        Crf {
            transitions: Param::from_tensor(tensor),
            n_tags,
        }
    }

    /// Enumerate every tag sequence and return the best score
    fn brute_force(emissions: &[f32], n_tags: usize, transitions: &[f32]) -> f32 {
        let steps = emissions.len() / n_tags;
        let mut best = f32::NEG_INFINITY;

        let total = n_tags.pow(steps as u32);
        for mut encoded in 0..total {
            let mut path = Vec::with_capacity(steps);
            for _ in 0..steps {
                path.push(encoded % n_tags);
                encoded /= n_tags;
            }

            let mut score = emissions[path[0]];
            for t in 1..steps {
                score += transitions[path[t - 1] * n_tags + path[t]] + emissions[t * n_tags + path[t]];
            }

            best = best.max(score);
        }

        best
    }

    #[test]
    fn viterbi_matches_brute_force_enumeration() {
        let emissions = vec![1.0, 0.2, 0.3, 0.1, 0.8, 0.4, 0.5, 0.2, 0.9];
        let transitions = vec![0.1, 0.5, -0.3, 0.2, -0.1, 0.4, 0.0, 0.3, 0.2];

        let (sequence, score) = viterbi_decode(&emissions, 3, &transitions);

        assert_eq!(sequence.len(), 3);
        let expected = brute_force(&emissions, 3, &transitions);
        assert!((score - expected).abs() < 1e-6);
    }

    #[test]
    fn viterbi_is_deterministic() {
        let emissions = vec![0.3, 0.7, 0.6, 0.1, 0.2, 0.5];
        let transitions = vec![0.0, 0.1, 0.2, 0.3];

        let first = viterbi_decode(&emissions, 2, &transitions);
        let second = viterbi_decode(&emissions, 2, &transitions);

        assert_eq!(first, second);
    }

    #[test]
    fn viterbi_breaks_ties_toward_the_first_path() {
        // all scores equal, so every path ties; the first tag must win
        let emissions = vec![0.0, 0.0, 0.0, 0.0];
        let transitions = vec![0.0, 0.0, 0.0, 0.0];

        let (sequence, _) = viterbi_decode(&emissions, 2, &transitions);

        assert_eq!(sequence, vec![0, 0]);
    }

    #[test]
    fn decode_respects_true_lengths() {
        let crf = crf_with(vec![0.0, 0.0, 0.0, 0.0], 2);

        let emissions: Tensor<B, 3> = Tensor::from_data(
            Data::new(
                vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
                Shape::new([2, 3, 2]),
            ),
            &device(),
        );

        let decoded = crf.decode(emissions, &[3, 2]);

        assert_eq!(decoded[0].0, vec![1, 0, 1]);
        assert_eq!(decoded[1].0.len(), 2);
    }

    #[test]
    fn single_tag_likelihood_is_exact() {
        // with one tag there is a single possible path, so the nll is zero
        let crf = crf_with(vec![0.0], 1);

        let emissions: Tensor<B, 3> = Tensor::from_data(
            Data::new(vec![0.4, -1.2, 2.0], Shape::new([1, 3, 1])),
            &device(),
        );
        let targets: Tensor<B, 2, Int> =
            Tensor::from_data(Data::new(vec![0, 0, 0], Shape::new([1, 3])), &device());

        let loss = crf.negative_log_likelihood(emissions, targets, &[3]);

        let value: f32 = loss.into_data().convert::<f32>().value[0];
        assert!(value.abs() < 1e-5);
    }

    #[test]
    fn likelihood_ignores_the_pad_region() {
        let crf = crf_with(vec![0.2, -0.4, 0.1, 0.3], 2);

        let emissions: Tensor<B, 3> = Tensor::from_data(
            Data::new(
                vec![0.5, 0.1, 0.2, 0.7, 0.0, 0.0],
                Shape::new([1, 3, 2]),
            ),
            &device(),
        );
        let padded: Tensor<B, 2, Int> =
            Tensor::from_data(Data::new(vec![0, 1, 0], Shape::new([1, 3])), &device());

        let truncated_emissions: Tensor<B, 3> = Tensor::from_data(
            Data::new(vec![0.5, 0.1, 0.2, 0.7], Shape::new([1, 2, 2])),
            &device(),
        );
        let truncated: Tensor<B, 2, Int> =
            Tensor::from_data(Data::new(vec![0, 1], Shape::new([1, 2])), &device());

        let padded_loss: f32 = crf
            .negative_log_likelihood(emissions, padded, &[2])
            .into_data()
            .convert::<f32>()
            .value[0];
        let truncated_loss: f32 = crf
            .negative_log_likelihood(truncated_emissions, truncated, &[2])
            .into_data()
            .convert::<f32>()
            .value[0];

        assert!((padded_loss - truncated_loss).abs() < 1e-5);
    }
}
