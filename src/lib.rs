//! Soft Actor-Critic training for iterative chapter summarization.
//!
//! An article is split into chapters; a character-level sequence policy
//! rewrites a running summary once per chapter, and a reward model scores
//! each rewrite for similarity, coverage, novelty, and garbling. The agent
//! is trained off-policy with twin critics over a replay buffer of
//! (observation, summary, reward) transitions.

pub mod algo;
pub mod config;
pub mod env;
pub mod memory;
pub mod metrics;
pub mod nn;
pub mod reward;
pub mod text;
pub mod trainer;
