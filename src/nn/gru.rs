//! Minimal GRU cell built from linear gates
//!
//! Burn's recurrent layers operate on whole sequences; autoregressive
//! decoding needs single-step control over the hidden state, so the cell is
//! assembled from `Linear` gate projections instead.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

/// Configuration for a [`GruCell`].
#[derive(Config, Debug)]
pub struct GruCellConfig {
    pub d_input: usize,
    pub d_hidden: usize,
}

impl GruCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        // Hidden-side projections carry no bias; the input-side bias is
        // enough for each gate.
        GruCell {
            reset_input: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            reset_hidden: LinearConfig::new(self.d_hidden, self.d_hidden)
                .with_bias(false)
                .init(device),
            update_input: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            update_hidden: LinearConfig::new(self.d_hidden, self.d_hidden)
                .with_bias(false)
                .init(device),
            candidate_input: LinearConfig::new(self.d_input, self.d_hidden).init(device),
            candidate_hidden: LinearConfig::new(self.d_hidden, self.d_hidden)
                .with_bias(false)
                .init(device),
            d_hidden: self.d_hidden,
        }
    }
}

/// Single-step gated recurrent unit.
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    reset_input: Linear<B>,
    reset_hidden: Linear<B>,
    update_input: Linear<B>,
    update_hidden: Linear<B>,
    candidate_input: Linear<B>,
    candidate_hidden: Linear<B>,
    d_hidden: usize,
}

impl<B: Backend> GruCell<B> {
    /// Advance the hidden state by one input step.
    ///
    /// Shapes: `input` is `[batch, d_input]`, `hidden` is `[batch, d_hidden]`.
    pub fn step(&self, input: Tensor<B, 2>, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        // r = σ(W_ir·x + W_hr·h)
        let r = sigmoid(self.reset_input.forward(input.clone()) + self.reset_hidden.forward(hidden.clone()));
        // z = σ(W_iz·x + W_hz·h)
        let z = sigmoid(self.update_input.forward(input.clone()) + self.update_hidden.forward(hidden.clone()));
        // n = tanh(W_in·x + r ⊙ (W_hn·h))
        let n = (self.candidate_input.forward(input) + r * self.candidate_hidden.forward(hidden.clone())).tanh();
        // h' = (1 − z) ⊙ n + z ⊙ h
        (z.clone().neg() + 1.0) * n + z * hidden
    }

    /// Zero-initialized hidden state for a batch.
    pub fn initial_state(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch_size, self.d_hidden], device)
    }

    pub fn d_hidden(&self) -> usize {
        self.d_hidden
    }
}
