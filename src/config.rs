//! Run configuration loaded from JSON, with CLI overrides on top.

use serde::{Deserialize, Serialize};

use crate::algo::AgentConfig;
use crate::trainer::TrainerConfig;

/// Complete configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub agent: AgentSection,
    pub network: NetworkSection,
    pub schedule: ScheduleSection,
}

/// SAC hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Discount factor γ (default: 0.99).
    pub gamma: f32,
    /// Soft update rate τ for target networks (default: 0.005).
    pub tau: f32,
    /// Entropy coefficient α (default: 0.2).
    pub alpha: f32,
    /// Mini-batch size for updates (default: 4).
    pub batch_size: usize,
    /// Policy learning rate (default: 3e-4).
    pub lr_policy: f64,
    /// Critic learning rate (default: 3e-4).
    pub lr_critic: f64,
}

/// Network sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Token embedding width (default: 96).
    pub embedding_dim: usize,
    /// GRU hidden width (default: 128).
    pub hidden_dim: usize,
    /// Lower bound on the decode budget (default: 64).
    pub min_summary_length: usize,
    /// Upper bound on the decode budget (default: 512).
    pub max_summary_length: usize,
}

/// Rollout schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSection {
    /// Number of training rounds (default: 1000).
    pub rounds: usize,
    /// Post-round updates; zero means one per chapter (default: 0).
    pub updates_per_round: usize,
    /// Replay buffer capacity (default: 32).
    pub replay_capacity: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection {
                gamma: 0.99,
                tau: 0.005,
                alpha: 0.2,
                batch_size: 4,
                lr_policy: 3e-4,
                lr_critic: 3e-4,
            },
            network: NetworkSection {
                embedding_dim: 96,
                hidden_dim: 128,
                min_summary_length: 64,
                max_summary_length: 512,
            },
            schedule: ScheduleSection {
                rounds: 1000,
                updates_per_round: 0,
                replay_capacity: 32,
            },
        }
    }
}

impl TrainConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            gamma: self.agent.gamma,
            tau: self.agent.tau,
            alpha: self.agent.alpha,
            batch_size: self.agent.batch_size,
            lr_policy: self.agent.lr_policy,
            lr_critic: self.agent.lr_critic,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            rounds: self.schedule.rounds,
            updates_per_round: self.schedule.updates_per_round,
        }
    }

    /// Decode budget for the policy: the longest chapter, clamped into the
    /// configured bounds.
    pub fn summary_length_budget(&self, longest_chapter: usize) -> usize {
        longest_chapter
            .min(self.network.max_summary_length)
            .max(self.network.min_summary_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_roundtrip_through_json() {
        let config = TrainConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrainConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.agent.batch_size, 4);
        assert_eq!(parsed.schedule.replay_capacity, 32);
        assert!((parsed.agent.tau - 0.005).abs() < 1e-9);
    }

    #[test]
    fn summary_budget_is_clamped() {
        let config = TrainConfig::default();
        assert_eq!(config.summary_length_budget(10), 64);
        assert_eq!(config.summary_length_budget(200), 200);
        assert_eq!(config.summary_length_budget(9000), 512);
    }
}
