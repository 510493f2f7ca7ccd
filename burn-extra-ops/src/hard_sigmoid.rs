//! Piecewise-linear sigmoid approximation, `clamp((x + bias) / divisor, 0, 1)`.

use burn::prelude::*;

/// Applies the hard sigmoid gate element-wise.
pub fn hard_sigmoid<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    bias: f64,
    divisor: f64,
) -> Tensor<B, D> {
    x.add_scalar(bias).div_scalar(divisor).clamp(0.0, 1.0)
}

/// Configuration for the `HardSigmoid` module.
#[derive(Config, Debug)]
pub struct HardSigmoidConfig {
    #[config(default = "3.0")]
    pub bias: f64,
    #[config(default = "6.0")]
    pub divisor: f64,
}

impl HardSigmoidConfig {
    pub const fn init(&self) -> HardSigmoid {
        HardSigmoid {
            bias: self.bias,
            divisor: self.divisor,
        }
    }
}

#[derive(Module, Clone, Debug)]
pub struct HardSigmoid {
    bias: f64,
    divisor: f64,
}

impl HardSigmoid {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        hard_sigmoid(x, self.bias, self.divisor)
    }
}
