//! Q-network scoring (observation, summary) token pairs
//!
//! The critic pools token embeddings with a padding-masked mean rather than a
//! recurrent pass; a scalar head scores the concatenated state and action
//! summaries. Targets mirror this structure and are moved only by Polyak
//! averaging.

use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;

use crate::nn::mlp::{soft_update_linear, soft_update_param, Mlp, MlpConfig};

/// Configuration for a [`SeqCritic`].
#[derive(Config, Debug)]
pub struct SeqCriticConfig {
    pub vocab_size: usize,
    #[config(default = 96)]
    pub embedding_dim: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
}

impl SeqCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SeqCritic<B> {
        SeqCritic {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            state_proj: LinearConfig::new(self.embedding_dim, self.hidden_dim).init(device),
            action_proj: LinearConfig::new(self.embedding_dim, self.hidden_dim).init(device),
            head: MlpConfig::new(self.hidden_dim * 2, vec![self.hidden_dim], 1).init(device),
        }
    }
}

/// Embedding + masked mean pooling + scalar scoring head.
#[derive(Module, Debug)]
pub struct SeqCritic<B: Backend> {
    embedding: Embedding<B>,
    state_proj: Linear<B>,
    action_proj: Linear<B>,
    head: Mlp<B>,
}

impl<B: Backend> SeqCritic<B> {
    /// Q-value per row: `[batch, 1]`.
    pub fn forward(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        action_tokens: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let state = self.pool(state_tokens);
        let action = self.pool(action_tokens);
        let state = self.state_proj.forward(state).tanh();
        let action = self.action_proj.forward(action).tanh();
        self.head.forward(Tensor::cat(vec![state, action], 1))
    }

    /// Mean of token embeddings over non-padding positions.
    fn pool(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let mask: Tensor<B, 3> = tokens.clone().not_equal_elem(0).float().unsqueeze_dim(2);
        let embedded = self.embedding.forward(tokens);

        let summed: Tensor<B, 2> = (embedded * mask.clone()).sum_dim(1).squeeze(1);
        let counts: Tensor<B, 2> = mask.sum_dim(1).squeeze(1).clamp_min(1.0);
        summed / counts
    }

    #[cfg(test)]
    pub(crate) fn embedding_weight(&self) -> Tensor<B, 2> {
        self.embedding.weight.val()
    }

    /// Polyak blend toward the online critic: θ′ ← τθ + (1 − τ)θ′.
    pub fn soft_update(self, online: &Self, tau: f32) -> Self {
        Self {
            embedding: soft_update_embedding(self.embedding, &online.embedding, tau),
            state_proj: soft_update_linear(self.state_proj, &online.state_proj, tau),
            action_proj: soft_update_linear(self.action_proj, &online.action_proj, tau),
            head: self.head.soft_update(&online.head, tau),
        }
    }
}

impl<B: burn::tensor::backend::AutodiffBackend> crate::algo::sac::SacCriticModel<B>
    for SeqCritic<B>
{
    fn q_value(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        action_tokens: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        self.forward(state_tokens, action_tokens)
    }

    fn soft_update(self, other: &Self, tau: f32) -> Self {
        SeqCritic::soft_update(self, other, tau)
    }
}

fn soft_update_embedding<B: Backend>(
    mut target: Embedding<B>,
    online: &Embedding<B>,
    tau: f32,
) -> Embedding<B> {
    target.weight = soft_update_param(target.weight, &online.weight, tau);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::tensor::TensorData;

    fn critic() -> SeqCritic<NdArray> {
        let device = NdArrayDevice::default();
        SeqCriticConfig::new(10)
            .with_embedding_dim(8)
            .with_hidden_dim(16)
            .init(&device)
    }

    fn int_tensor(values: Vec<i64>, shape: [usize; 2]) -> Tensor<NdArray, 2, Int> {
        let device = NdArrayDevice::default();
        Tensor::from_data(TensorData::new(values, shape), &device)
    }

    #[test]
    fn forward_is_scalar_per_row() {
        let critic = critic();
        let state = int_tensor(vec![1, 5, 6, 2, 1, 7, 2, 0], [2, 4]);
        let action = int_tensor(vec![5, 2, 0, 6, 7, 2], [2, 3]);

        let q = critic.forward(state, action);
        assert_eq!(q.shape().dims, [2, 1]);
        for value in q.into_data().iter::<f32>() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn padding_does_not_change_the_score() {
        let critic = critic();
        let state = int_tensor(vec![1, 5, 2], [1, 3]);
        let state_padded = int_tensor(vec![1, 5, 2, 0, 0], [1, 5]);
        let action = int_tensor(vec![5, 2], [1, 2]);

        let q = critic.forward(state, action.clone()).into_scalar();
        let q_padded = critic.forward(state_padded, action).into_scalar();
        assert!((q - q_padded).abs() < 1e-5);
    }

    #[test]
    fn soft_update_is_a_weighted_blend()  {
        let device = NdArrayDevice::default();
        let config = SeqCriticConfig::new(6).with_embedding_dim(4).with_hidden_dim(8);
        let target = config.init::<NdArray>(&device);
        let online = config.init::<NdArray>(&device);

        let before: Vec<f32> = target.embedding.weight.val().into_data().iter().collect();
        let online_w: Vec<f32> = online.embedding.weight.val().into_data().iter().collect();

        let tau = 0.1;
        let blended = target.soft_update(&online, tau);
        let after: Vec<f32> = blended.embedding.weight.val().into_data().iter().collect();

        for ((b, o), a) in before.iter().zip(&online_w).zip(&after) {
            let expected = b * (1.0 - tau) + o * tau;
            assert!((a - expected).abs() < 1e-5);
        }
    }
}
