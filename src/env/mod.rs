//! Environment abstraction for iterative chapter summarization

pub mod article;

pub use article::{split_segments, ArticleEnv, SEGMENT_SEPARATOR};

/// Observation presented to the policy before each step.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// The accumulated summary produced so far.
    pub previous_summary: String,
    /// The chapter to be summarized on this step. Empty in terminal states.
    pub chapter_text: String,
    /// 1-based step index within the round.
    pub step_index: usize,
}

/// Action emitted by the policy: a token sequence and its decoded text.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub token_ids: Vec<usize>,
    pub text: String,
    /// Effective length up to and including the first end-of-sequence token.
    pub length: usize,
}

/// One (state, action, reward, next-state, done) tuple.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_state: Observation,
    pub done: bool,
}
