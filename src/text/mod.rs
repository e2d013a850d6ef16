//! Text encoding collaborators for the policy and value networks

pub mod tokenizer;

pub use tokenizer::CharTokenizer;
