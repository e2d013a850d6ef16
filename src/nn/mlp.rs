//! Small feedforward stack used as the critic's scoring head

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for a feedforward [`Mlp`].
#[derive(Config, Debug)]
pub struct MlpConfig {
    pub input_dim: usize,
    /// Hidden layer widths, e.g. `[128]` for one hidden layer.
    pub hidden_layers: Vec<usize>,
    pub output_dim: usize,
}

/// ReLU feedforward network; the output layer is linear.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut dims = vec![self.input_dim];
        dims.extend(self.hidden_layers.iter().copied());
        dims.push(self.output_dim);

        let layers = dims
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();
        Mlp { layers }
    }
}

impl<B: Backend> Mlp<B> {
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut x = input;
        for layer in &self.layers[..self.layers.len() - 1] {
            x = relu(layer.forward(x));
        }
        self.layers[self.layers.len() - 1].forward(x)
    }

    /// Polyak blend toward `other`: θ′ ← τθ + (1 − τ)θ′.
    pub fn soft_update(self, other: &Self, tau: f32) -> Self {
        let layers = self
            .layers
            .into_iter()
            .zip(other.layers.iter())
            .map(|(target, online)| soft_update_linear(target, online, tau))
            .collect();
        Mlp { layers }
    }
}

pub(crate) fn soft_update_param<B: Backend, const D: usize>(
    target: Param<Tensor<B, D>>,
    online: &Param<Tensor<B, D>>,
    tau: f32,
) -> Param<Tensor<B, D>> {
    // Detach keeps the blend out of any surviving autodiff graph.
    target.map(|tensor| tensor * (1.0 - tau) + online.val().detach() * tau)
}

pub(crate) fn soft_update_linear<B: Backend>(
    mut target: Linear<B>,
    online: &Linear<B>,
    tau: f32,
) -> Linear<B> {
    target.weight = soft_update_param(target.weight, &online.weight, tau);
    target.bias = match (target.bias, &online.bias) {
        (Some(b_target), Some(b_online)) => Some(soft_update_param(b_target, b_online, tau)),
        _ => None,
    };
    target
}
