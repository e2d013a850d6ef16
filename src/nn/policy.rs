//! Stochastic sequence policy over character tokens
//!
//! Encoder-decoder GRU: the encoded observation seeds the decoder's hidden
//! state, and tokens are emitted autoregressively until the end-of-sequence
//! token or the maximum summary length. The stochastic path also reports the
//! summed log-probability of the emitted sequence, masked past the first
//! end-of-sequence token.

use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::TensorData;
use rand::{thread_rng, Rng};

/// Configuration for a [`SeqPolicy`].
#[derive(Config, Debug)]
pub struct SeqPolicyConfig {
    pub vocab_size: usize,
    pub max_summary_length: usize,
    pub bos_id: usize,
    pub eos_id: usize,
    #[config(default = 96)]
    pub embedding_dim: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
}

impl SeqPolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SeqPolicy<B> {
        SeqPolicy {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            encoder: crate::nn::GruCellConfig::new(self.embedding_dim, self.hidden_dim)
                .init(device),
            decoder: crate::nn::GruCellConfig::new(self.embedding_dim, self.hidden_dim)
                .init(device),
            output: LinearConfig::new(self.hidden_dim, self.vocab_size).init(device),
            max_summary_length: self.max_summary_length,
            bos_id: self.bos_id,
            eos_id: self.eos_id,
        }
    }
}

/// Token sequences sampled from the stochastic policy.
pub struct SampledSequences<B: Backend> {
    /// `[batch, steps]` sampled token ids, including tokens past each row's
    /// first end-of-sequence token (masked out of the log-probability).
    pub actions: Tensor<B, 2, Int>,
    /// `[batch, 1]` summed log-probability of each row's effective sequence.
    pub log_prob: Tensor<B, 2>,
    /// Effective length per row: up to and including the first
    /// end-of-sequence token, clamped to at least 1.
    pub lengths: Vec<usize>,
}

/// Embedding + GRU encoder + GRU decoder + linear vocabulary head.
#[derive(Module, Debug)]
pub struct SeqPolicy<B: Backend> {
    embedding: Embedding<B>,
    encoder: crate::nn::GruCell<B>,
    decoder: crate::nn::GruCell<B>,
    output: Linear<B>,
    max_summary_length: usize,
    bos_id: usize,
    eos_id: usize,
}

impl<B: Backend> SeqPolicy<B> {
    pub fn max_summary_length(&self) -> usize {
        self.max_summary_length
    }

    pub fn eos_id(&self) -> usize {
        self.eos_id
    }

    /// Run the encoder over a padded token batch, returning the hidden state
    /// at each row's last valid position.
    fn encode(&self, tokens: Tensor<B, 2, Int>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let device = tokens.device();
        let [batch, seq_len] = tokens.dims();
        let embedded = self.embedding.forward(tokens);
        let [_, _, emb_dim] = embedded.dims();

        let mut hidden = self.encoder.initial_state(batch, &device);
        for t in 0..seq_len {
            let input: Tensor<B, 2> = embedded
                .clone()
                .slice([0..batch, t..t + 1, 0..emb_dim])
                .squeeze(1);
            let next = self.encoder.step(input, hidden.clone());
            // Freeze rows whose sequence already ended (padding positions).
            let active: Tensor<B, 2> = lengths
                .clone()
                .greater_elem(t as i64)
                .float()
                .unsqueeze_dim(1);
            hidden = next * active.clone() + hidden * (active.neg() + 1.0);
        }
        hidden
    }

    /// One decoder step: embed the previous token, advance the hidden state,
    /// and project to vocabulary logits.
    fn decode_step(
        &self,
        prev: Tensor<B, 2, Int>,
        hidden: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let embedded: Tensor<B, 2> = self.embedding.forward(prev).squeeze(1);
        let hidden = self.decoder.step(embedded, hidden);
        let logits = self.output.forward(hidden.clone());
        (logits, hidden)
    }

    fn bos_batch(&self, batch: usize, device: &B::Device) -> Tensor<B, 2, Int> {
        Tensor::from_data(
            TensorData::new(vec![self.bos_id as i64; batch], [batch, 1]),
            device,
        )
    }

    /// Effective length per row: index of the first end token plus one, or
    /// the full generated length when no end token appeared.
    fn effective_lengths(&self, sampled: &[Vec<i64>]) -> Vec<usize> {
        sampled
            .iter()
            .map(|row| {
                row.iter()
                    .position(|&id| id == self.eos_id as i64)
                    .map(|idx| idx + 1)
                    .unwrap_or(row.len())
                    .max(1)
            })
            .collect()
    }

    fn length_mask(&self, lengths: &[usize], steps: usize, device: &B::Device) -> Tensor<B, 2> {
        let mut flat = vec![0.0f32; lengths.len() * steps];
        for (row, &len) in lengths.iter().enumerate() {
            for col in 0..len.min(steps) {
                flat[row * steps + col] = 1.0;
            }
        }
        Tensor::from_data(TensorData::new(flat, [lengths.len(), steps]), device)
    }

    /// Sample token sequences autoregressively from the learned distribution.
    pub fn sample(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> SampledSequences<B> {
        let device = state_tokens.device();
        let [batch, _] = state_tokens.dims();
        let mut hidden = self.encode(state_tokens, state_lengths);
        let mut prev = self.bos_batch(batch, &device);

        let mut rng = thread_rng();
        let mut finished = vec![false; batch];
        let mut sampled: Vec<Vec<i64>> = vec![Vec::new(); batch];
        let mut action_cols: Vec<Tensor<B, 2, Int>> = Vec::new();
        let mut log_prob_cols: Vec<Tensor<B, 2>> = Vec::new();

        for _ in 0..self.max_summary_length {
            let (logits, next_hidden) = self.decode_step(prev, hidden);
            hidden = next_hidden;

            let log_probs = log_softmax(logits, 1);
            let probs: Vec<f32> = log_probs.clone().exp().into_data().iter().collect();
            let vocab = probs.len() / batch;

            let mut ids = Vec::with_capacity(batch);
            for row in 0..batch {
                let id = sample_categorical(&probs[row * vocab..(row + 1) * vocab], &mut rng);
                ids.push(id as i64);
            }

            let chosen: Tensor<B, 2, Int> =
                Tensor::from_data(TensorData::new(ids.clone(), [batch, 1]), &device);
            log_prob_cols.push(log_probs.gather(1, chosen.clone()));
            action_cols.push(chosen.clone());

            for (row, &id) in ids.iter().enumerate() {
                sampled[row].push(id);
                finished[row] |= id == self.eos_id as i64;
            }
            prev = chosen;
            if finished.iter().all(|f| *f) {
                break;
            }
        }

        let steps = action_cols.len();
        let actions = Tensor::cat(action_cols, 1);
        let per_step = Tensor::cat(log_prob_cols, 1);
        let lengths = self.effective_lengths(&sampled);
        let mask = self.length_mask(&lengths, steps, &device);
        let log_prob: Tensor<B, 2> = (per_step * mask).sum_dim(1);

        SampledSequences {
            actions,
            log_prob,
            lengths,
        }
    }

    /// Greedy decoding: the highest-probability token at each position, same
    /// termination rule as sampling, no log-probability.
    pub fn greedy(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 2, Int>, Vec<usize>) {
        let device = state_tokens.device();
        let [batch, _] = state_tokens.dims();
        let mut hidden = self.encode(state_tokens, state_lengths);
        let mut prev = self.bos_batch(batch, &device);

        let mut finished = vec![false; batch];
        let mut chosen_ids: Vec<Vec<i64>> = vec![Vec::new(); batch];
        let mut action_cols: Vec<Tensor<B, 2, Int>> = Vec::new();

        for _ in 0..self.max_summary_length {
            let (logits, next_hidden) = self.decode_step(prev, hidden);
            hidden = next_hidden;

            let chosen = logits.argmax(1);
            let ids: Vec<i64> = chosen.clone().into_data().iter().collect();
            action_cols.push(chosen.clone());

            for (row, &id) in ids.iter().enumerate() {
                chosen_ids[row].push(id);
                finished[row] |= id == self.eos_id as i64;
            }
            prev = chosen;
            if finished.iter().all(|f| *f) {
                break;
            }
        }

        let actions = Tensor::cat(action_cols, 1);
        let lengths = self.effective_lengths(&chosen_ids);
        (actions, lengths)
    }
}

impl<B: burn::tensor::backend::AutodiffBackend> crate::algo::sac::SacPolicyModel<B>
    for SeqPolicy<B>
{
    fn sample_action(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> crate::algo::sac::PolicySample<B> {
        let out = self.sample(state_tokens, state_lengths);
        crate::algo::sac::PolicySample {
            actions: out.actions,
            log_prob: out.log_prob,
            lengths: out.lengths,
        }
    }

    fn greedy_action(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 2, Int>, Vec<usize>) {
        self.greedy(state_tokens, state_lengths)
    }
}

/// Draw an index from a probability vector by inverse transform sampling.
fn sample_categorical<R: Rng>(probs: &[f32], rng: &mut R) -> usize {
    let draw: f32 = rng.gen();
    let mut cumulative = 0.0f32;
    for (idx, &p) in probs.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return idx;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    fn policy(max_len: usize) -> SeqPolicy<NdArray> {
        let device = NdArrayDevice::default();
        SeqPolicyConfig::new(12, max_len, 1, 2)
            .with_embedding_dim(8)
            .with_hidden_dim(16)
            .init(&device)
    }

    fn tokens(device: &NdArrayDevice) -> (Tensor<NdArray, 2, Int>, Tensor<NdArray, 1, Int>) {
        let tokens = Tensor::from_data(TensorData::new(vec![1i64, 5, 6, 2], [1, 4]), device);
        let lengths = Tensor::from_data(TensorData::new(vec![4i64], [1]), device);
        (tokens, lengths)
    }

    #[test]
    fn sample_respects_max_length() {
        let device = NdArrayDevice::default();
        let policy = policy(6);
        let (state, lengths) = tokens(&device);

        let out = policy.sample(state, lengths);
        let [batch, steps] = out.actions.dims();
        assert_eq!(batch, 1);
        assert!(steps >= 1 && steps <= 6);
        assert!(out.lengths[0] >= 1 && out.lengths[0] <= steps);
        assert_eq!(out.log_prob.dims(), [1, 1]);
    }

    #[test]
    fn effective_length_truncates_at_first_eos() {
        let policy = policy(8);
        // eos id is 2; everything past the first occurrence is ignored.
        let lengths = policy.effective_lengths(&[vec![5, 2, 7, 2], vec![5, 5, 5]]);
        assert_eq!(lengths, vec![2, 3]);
    }

    #[test]
    fn log_prob_is_finite_and_nonpositive() {
        let device = NdArrayDevice::default();
        let policy = policy(5);
        let (state, lengths) = tokens(&device);

        let out = policy.sample(state, lengths);
        let lp: f32 = out.log_prob.into_scalar();
        assert!(lp.is_finite());
        // A sum of log-probabilities can never be positive.
        assert!(lp <= 0.0);
    }

    #[test]
    fn greedy_is_deterministic() {
        let device = NdArrayDevice::default();
        let policy = policy(6);

        let (state_a, lengths_a) = tokens(&device);
        let (state_b, lengths_b) = tokens(&device);
        let (actions_a, lengths_out_a) = policy.greedy(state_a, lengths_a);
        let (actions_b, lengths_out_b) = policy.greedy(state_b, lengths_b);

        let a: Vec<i64> = actions_a.into_data().iter().collect();
        let b: Vec<i64> = actions_b.into_data().iter().collect();
        assert_eq!(a, b);
        assert_eq!(lengths_out_a, lengths_out_b);
    }

    #[test]
    fn categorical_sampling_covers_support() {
        let mut rng = thread_rng();
        let probs = [0.0f32, 1.0, 0.0];
        for _ in 0..20 {
            assert_eq!(sample_categorical(&probs, &mut rng), 1);
        }
    }
}
