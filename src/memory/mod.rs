//! Experience replay storage

pub mod replay;

pub use replay::ReplayBuffer;
