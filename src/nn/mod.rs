//! Neural network building blocks for the summarization policy and critics

pub mod critic;
pub mod gru;
pub mod mlp;
pub mod policy;

pub use critic::{SeqCritic, SeqCriticConfig};
pub use gru::{GruCell, GruCellConfig};
pub use mlp::{Mlp, MlpConfig};
pub use policy::{SeqPolicy, SeqPolicyConfig};
