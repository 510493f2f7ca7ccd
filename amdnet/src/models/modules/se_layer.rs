//! # Squeeze-and-Excitation Layer
//!
//! Global average pooling, a 1x1 bottleneck with ReLU, then a 1x1 expansion
//! gated by a hard sigmoid. The gate rescales every channel of the input.

use burn::{
    nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    prelude::*,
};
use burn_extra_ops::{HardSigmoid, HardSigmoidConfig};

use super::conv_module::{ConvModule, ConvModuleConfig};
use crate::{
    config::{ActivationConfig, NormConfig},
    error::AmdNetResult,
    init::LayerInitConfig,
};

/// Configuration for the `SeLayer` module.
#[derive(Config, Debug)]
pub struct SeLayerConfig {
    /// Input channels. Overwritten by the fusion block it belongs to.
    #[config(default = "64")]
    pub channels: usize,
    /// Squeeze ratio of the bottleneck.
    #[config(default = "16")]
    pub ratio: usize,
    #[config(default = "3.0")]
    pub gate_bias: f64,
    #[config(default = "6.0")]
    pub gate_divisor: f64,
}

impl SeLayerConfig {
    /// Initializes a new `SeLayer` module.
    ///
    /// # Errors
    ///
    /// Propagates `ConvModule` construction errors.
    pub fn init<B: Backend>(
        &self,
        layer_init: &LayerInitConfig,
        device: &Device<B>,
    ) -> AmdNetResult<SeLayer<B>> {
        let hidden = make_divisible(self.channels / self.ratio.max(1), 8);

        let conv1 = ConvModuleConfig::new(self.channels, hidden)
            .with_kernel_size(1)
            .with_norm(NormConfig::None)
            .with_act(Some(ActivationConfig::Relu))
            .with_layer_init(layer_init.clone())
            .init(device)?;
        let conv2 = ConvModuleConfig::new(hidden, self.channels)
            .with_kernel_size(1)
            .with_norm(NormConfig::None)
            .with_act(None)
            .with_layer_init(layer_init.clone())
            .init(device)?;

        Ok(SeLayer {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            conv1,
            conv2,
            gate: HardSigmoidConfig::new()
                .with_bias(self.gate_bias)
                .with_divisor(self.gate_divisor)
                .init(),
        })
    }
}

/// Channel gate from globally pooled features.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct SeLayer<B: Backend> {
    pool: AdaptiveAvgPool2d,
    pub(crate) conv1: ConvModule<B>,
    pub(crate) conv2: ConvModule<B>,
    gate: HardSigmoid,
}

impl<B: Backend> SeLayer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.pool.forward(x.clone());
        let out = self.conv1.forward(out);
        let out = self.gate.forward(self.conv2.forward(out));
        x * out
    }
}

/// Rounds `value` to the nearest multiple of `divisor`, never going below
/// `divisor` or under 90% of `value`.
pub fn make_divisible(value: usize, divisor: usize) -> usize {
    let rounded = ((value + divisor / 2) / divisor * divisor).max(divisor);
    if rounded * 10 < value * 9 {
        rounded + divisor
    } else {
        rounded
    }
}
