//! Fixed-capacity FIFO replay buffer with uniform sampling

use anyhow::{ensure, Result};
use rand::seq::index;
use rand::thread_rng;

use crate::env::Transition;

/// A fixed-capacity store of transitions.
///
/// Insertion order defines eviction order: once the buffer is full, pushing a
/// new transition evicts the oldest one. Sampling is uniform without
/// duplicates within a call and never blocks or grows the buffer.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    storage: std::collections::VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a buffer holding at most `capacity` transitions.
    pub fn new(capacity: usize) -> Result<Self> {
        ensure!(capacity > 0, "replay capacity must be positive");
        Ok(Self {
            storage: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Insert a transition, evicting the oldest entry when at capacity.
    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() >= self.capacity {
            self.storage.pop_front();
        }
        self.storage.push_back(transition);
    }

    /// Sample up to `n` distinct transitions uniformly at random.
    ///
    /// Returns `min(n, len)` clones; an empty buffer yields an empty vector.
    pub fn sample(&self, n: usize) -> Vec<Transition> {
        let count = n.min(self.storage.len());
        if count == 0 {
            return Vec::new();
        }
        let mut rng = thread_rng();
        index::sample(&mut rng, self.storage.len(), count)
            .into_iter()
            .map(|i| self.storage[i].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
