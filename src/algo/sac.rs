//! Soft Actor-Critic over variable-length token sequences
//!
//! Off-policy actor-critic with twin critics, entropy-regularized targets,
//! and Polyak-averaged target networks. States and actions are token
//! sequences rather than fixed-width vectors: the policy emits summaries
//! autoregressively and the critics score (observation, summary) pairs.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, AdamW, AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    tensor::{ElementConversion, TensorData},
};
use nn::loss::{MseLoss, Reduction};

use crate::env::{Action, Observation, Transition};
use crate::memory::ReplayBuffer;
use crate::text::CharTokenizer;

/// Token sequences sampled from a stochastic policy.
pub struct PolicySample<B: Backend> {
    /// `[batch, steps]` sampled token ids. Rows may keep decoding past their
    /// first end-of-sequence token; those positions are excluded from the
    /// log-probability and the reported length.
    pub actions: Tensor<B, 2, Int>,
    /// `[batch, 1]` summed log-probability of each row's effective sequence.
    pub log_prob: Tensor<B, 2>,
    /// Effective length per row, up to and including the first
    /// end-of-sequence token.
    pub lengths: Vec<usize>,
}

/// A burn module usable as the SAC policy
///
/// The policy consumes a padded batch of encoded observations and produces
/// token sequences, either stochastically (with log-probabilities, for
/// training) or greedily (for evaluation).
pub trait SacPolicyModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Autoregressive sampling from the learned distribution.
    fn sample_action(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> PolicySample<B>;

    /// Greedy decoding: highest-probability token at each step, same
    /// termination rule, no log-probability.
    fn greedy_action(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        state_lengths: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 2, Int>, Vec<usize>);
}

/// A burn module usable as a SAC critic
pub trait SacCriticModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Q-value per row: `[batch, 1]`.
    fn q_value(
        &self,
        state_tokens: Tensor<B, 2, Int>,
        action_tokens: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2>;

    /// Soft update the parameters of the target network
    ///
    /// θ′ ← τθ + (1 − τ)θ′
    fn soft_update(self, other: &Self, tau: f32) -> Self;
}

/// Hyperparameters for the [`SacAgent`]
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// The discount factor γ
    pub gamma: f32,
    /// The soft update rate τ for target networks
    pub tau: f32,
    /// The entropy coefficient α (fixed, no automatic tuning)
    pub alpha: f32,
    /// The size of batches sampled from the replay buffer
    pub batch_size: usize,
    /// The learning rate for the policy network
    pub lr_policy: f64,
    /// The learning rate for both critic networks
    pub lr_critic: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.005,
            alpha: 0.2,
            batch_size: 4,
            lr_policy: 3e-4,
            lr_critic: 3e-4,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.gamma >= 0.0, "gamma must be non-negative");
        ensure!(self.tau >= 0.0, "tau must be non-negative");
        ensure!(self.alpha >= 0.0, "alpha must be non-negative");
        ensure!(self.batch_size > 0, "batch size must be positive");
        Ok(())
    }
}

/// Scalar metrics from one update step.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateMetrics {
    pub policy_loss: f32,
    pub q1_loss: f32,
    pub q2_loss: f32,
    pub mean_reward: f32,
}

/// A Soft Actor-Critic agent for iterative text summarization
///
/// Owns the policy, both online critics, their Polyak-averaged targets, the
/// optimizers, and the replay buffer. Targets start as exact copies of the
/// online critics and are only ever moved by soft updates, never by gradient
/// descent.
///
/// ### Generics
/// - `B` - A burn autodiff backend
/// - `P` - Policy network implementing [`SacPolicyModel`]
/// - `C` - Critic network implementing [`SacCriticModel`]
pub struct SacAgent<B, P, C>
where
    B: AutodiffBackend,
    P: SacPolicyModel<B>,
    C: SacCriticModel<B>,
{
    // Networks (Option for ownership during optimization)
    policy: Option<P>,
    q1: Option<C>,
    q2: Option<C>,
    target_q1: Option<C>,
    target_q2: Option<C>,

    optimizer_policy: OptimizerAdaptor<AdamW, P, B>,
    optimizer_q1: OptimizerAdaptor<AdamW, C, B>,
    optimizer_q2: OptimizerAdaptor<AdamW, C, B>,

    buffer: ReplayBuffer,
    tokenizer: CharTokenizer,
    config: AgentConfig,
    device: B::Device,
}

impl<B, P, C> SacAgent<B, P, C>
where
    B: AutodiffBackend,
    P: SacPolicyModel<B>,
    C: SacCriticModel<B>,
{
    pub fn new(
        policy: P,
        q1: C,
        q2: C,
        buffer: ReplayBuffer,
        tokenizer: CharTokenizer,
        config: AgentConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;

        // Initialize target critics as copies of online critics
        let target_q1 = q1.clone();
        let target_q2 = q2.clone();

        Ok(Self {
            policy: Some(policy),
            q1: Some(q1),
            q2: Some(q2),
            target_q1: Some(target_q1),
            target_q2: Some(target_q2),
            optimizer_policy: AdamWConfig::new()
                .with_grad_clipping(Some(GradientClippingConfig::Value(1.0)))
                .init(),
            optimizer_q1: AdamWConfig::new()
                .with_grad_clipping(Some(GradientClippingConfig::Value(1.0)))
                .init(),
            optimizer_q2: AdamWConfig::new()
                .with_grad_clipping(Some(GradientClippingConfig::Value(1.0)))
                .init(),
            buffer,
            tokenizer,
            config,
            device,
        })
    }

    pub fn tokenizer(&self) -> &CharTokenizer {
        &self.tokenizer
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Select a summary action for the given observation
    ///
    /// Stochastic sampling during training; greedy decoding when
    /// `deterministic` is set (evaluation).
    pub fn act(&self, observation: &Observation, deterministic: bool) -> Result<Action> {
        let encoded = self.tokenizer.encode_observation(observation);
        let (tokens, lengths) = self.tokenizer.batch_encode::<B>(&[encoded], &self.device)?;

        let policy = self.policy.as_ref().unwrap();
        let (action_ids, length) = if deterministic {
            let (actions, lengths) = policy.greedy_action(tokens, lengths);
            (actions, lengths[0])
        } else {
            let sampled = policy.sample_action(tokens, lengths);
            (sampled.actions, sampled.lengths[0])
        };

        let token_ids: Vec<usize> = action_ids
            .into_data()
            .iter::<i64>()
            .map(|id| id as usize)
            .collect();
        let text = self.tokenizer.decode(&token_ids);
        Ok(Action {
            token_ids,
            text,
            length,
        })
    }

    /// Store a transition in the replay buffer.
    pub fn record(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    /// One SAC update on a uniformly sampled mini-batch
    ///
    /// An empty buffer is the defined cold-start case: the update is a no-op
    /// that returns zeroed metrics rather than an error.
    pub fn update(&mut self) -> Result<UpdateMetrics> {
        if self.buffer.is_empty() {
            return Ok(UpdateMetrics::default());
        }

        let batch = self.buffer.sample(self.config.batch_size);
        let batch_size = batch.len();

        let states: Vec<Vec<usize>> = batch
            .iter()
            .map(|t| self.tokenizer.encode_observation(&t.state))
            .collect();
        let actions: Vec<Vec<usize>> = batch.iter().map(|t| t.action.token_ids.clone()).collect();
        let next_states: Vec<Vec<usize>> = batch
            .iter()
            .map(|t| self.tokenizer.encode_observation(&t.next_state))
            .collect();
        let rewards_raw: Vec<f32> = batch.iter().map(|t| t.reward).collect();

        let (state_tokens, state_lengths) =
            self.tokenizer.batch_encode::<B>(&states, &self.device)?;
        let (action_tokens, _) = self.tokenizer.batch_encode::<B>(&actions, &self.device)?;
        let (next_state_tokens, next_state_lengths) = self
            .tokenizer
            .batch_encode::<B>(&next_states, &self.device)?;

        let rewards: Tensor<B, 2> = Tensor::from_data(
            TensorData::new(rewards_raw.clone(), [batch_size, 1]),
            &self.device,
        );
        let non_terminal: Tensor<B, 2> = Tensor::from_data(
            TensorData::new(
                batch
                    .iter()
                    .map(|t| if t.done { 0.0 } else { 1.0 })
                    .collect::<Vec<f32>>(),
                [batch_size, 1],
            ),
            &self.device,
        );

        let policy = self.policy.as_ref().unwrap();
        let target_q1 = self.target_q1.as_ref().unwrap();
        let target_q2 = self.target_q2.as_ref().unwrap();

        // Entropy-regularized soft value of the next state, bootstrapped
        // through the target critics: min(Q1', Q2') − α·log_π
        let next = policy.sample_action(next_state_tokens.clone(), next_state_lengths);
        let tq1 = target_q1
            .q_value(next_state_tokens.clone(), next.actions.clone())
            .detach();
        let tq2 = target_q2.q_value(next_state_tokens, next.actions).detach();
        let target_value = tq1
            .min_pair(tq2)
            .sub(next.log_prob.detach().mul_scalar(self.config.alpha));

        // y = r + γ·(1 − done)·soft_value; terminal rows drop the bootstrap
        let td_target = rewards
            .add((non_terminal * target_value).mul_scalar(self.config.gamma))
            .detach();

        // Critic updates: MSE against the shared regression target
        let q1 = self.q1.take().unwrap();
        let q2 = self.q2.take().unwrap();

        let q1_pred = q1.q_value(state_tokens.clone(), action_tokens.clone());
        let q2_pred = q2.q_value(state_tokens.clone(), action_tokens);
        let q1_loss = MseLoss::new().forward(q1_pred, td_target.clone(), Reduction::Mean);
        let q2_loss = MseLoss::new().forward(q2_pred, td_target, Reduction::Mean);

        let grads1 = GradientsParams::from_grads(q1_loss.backward(), &q1);
        let grads2 = GradientsParams::from_grads(q2_loss.backward(), &q2);
        let q1 = self.optimizer_q1.step(self.config.lr_critic, q1, grads1);
        let q2 = self.optimizer_q2.step(self.config.lr_critic, q2, grads2);

        // Policy update: minimize α·log_π − Q1. Only the policy's gradients
        // are extracted and stepped, so critic-1 stays frozen here.
        let policy = self.policy.take().unwrap();
        let fresh = policy.sample_action(state_tokens.clone(), state_lengths);
        let q1_for_policy = q1.q_value(state_tokens, fresh.actions);
        let policy_loss = fresh
            .log_prob
            .mul_scalar(self.config.alpha)
            .sub(q1_for_policy)
            .mean();

        let policy_grads = GradientsParams::from_grads(policy_loss.backward(), &policy);
        let policy = self
            .optimizer_policy
            .step(self.config.lr_policy, policy, policy_grads);

        // Polyak update both targets from the freshly stepped critics
        let target_q1 = self.target_q1.take().unwrap();
        let target_q2 = self.target_q2.take().unwrap();
        self.target_q1 = Some(target_q1.soft_update(&q1, self.config.tau));
        self.target_q2 = Some(target_q2.soft_update(&q2, self.config.tau));

        let q1_loss_value: f32 = q1_loss.into_scalar().elem();
        let q2_loss_value: f32 = q2_loss.into_scalar().elem();
        let policy_loss_value: f32 = policy_loss.into_scalar().elem();
        let mean_reward = rewards_raw.iter().sum::<f32>() / batch_size as f32;

        self.policy = Some(policy);
        self.q1 = Some(q1);
        self.q2 = Some(q2);

        Ok(UpdateMetrics {
            policy_loss: policy_loss_value,
            q1_loss: q1_loss_value,
            q2_loss: q2_loss_value,
            mean_reward,
        })
    }

    /// Persist policy and critic parameters under `dir`
    ///
    /// The on-disk format is burn's record format; the snapshot is opaque to
    /// callers.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let recorder = CompactRecorder::new();
        self.policy
            .clone()
            .unwrap()
            .save_file(dir.join("policy"), &recorder)
            .context("failed to save policy")?;
        self.q1
            .clone()
            .unwrap()
            .save_file(dir.join("q1"), &recorder)
            .context("failed to save critic 1")?;
        self.q2
            .clone()
            .unwrap()
            .save_file(dir.join("q2"), &recorder)
            .context("failed to save critic 2")?;
        Ok(())
    }

    /// Restore parameters from a snapshot written by [`SacAgent::save`]
    ///
    /// Targets are reset to copies of the restored critics.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        let policy = self
            .policy
            .take()
            .unwrap()
            .load_file(dir.join("policy"), &recorder, &self.device)
            .context("failed to load policy")?;
        let q1 = self
            .q1
            .take()
            .unwrap()
            .load_file(dir.join("q1"), &recorder, &self.device)
            .context("failed to load critic 1")?;
        let q2 = self
            .q2
            .take()
            .unwrap()
            .load_file(dir.join("q2"), &recorder, &self.device)
            .context("failed to load critic 2")?;

        self.target_q1 = Some(q1.clone());
        self.target_q2 = Some(q2.clone());
        self.policy = Some(policy);
        self.q1 = Some(q1);
        self.q2 = Some(q2);
        Ok(())
    }

}
