/// Soft Actor-Critic
pub mod sac;

pub use sac::{AgentConfig, SacAgent, UpdateMetrics};
