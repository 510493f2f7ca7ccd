//! # Convolutional Block Attention Module
//!
//! Channel attention followed by spatial attention, each a sigmoid gate
//! multiplied onto the features, with an optional residual connection around
//! the pair.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

use crate::init::ConvInit;

/// Configuration for the `Cbam` module.
#[derive(Config, Debug)]
pub struct CbamConfig {
    /// Input channels. Overwritten by the fusion block it belongs to.
    #[config(default = "512")]
    pub channels: usize,
    /// Channel reduction of the shared bottleneck.
    #[config(default = "16")]
    pub reduction: usize,
    /// Odd kernel size of the spatial attention convolution.
    #[config(default = "49")]
    pub kernel_size: usize,
    /// Add the block input to the gated output.
    #[config(default = "true")]
    pub residual: bool,
}

impl CbamConfig {
    /// Initializes a new `Cbam` module.
    pub fn init<B: Backend>(&self, conv_init: &ConvInit, device: &Device<B>) -> Cbam<B> {
        let hidden = (self.channels / self.reduction.max(1)).max(1);
        let conv1x1 = |[c_in, c_out]: [usize; 2]| {
            Conv2dConfig::new([c_in, c_out], [1, 1])
                .with_bias(false)
                .with_initializer(conv_init.initializer())
                .init(device)
        };

        Cbam {
            channel: ChannelAttention {
                squeeze: conv1x1([self.channels, hidden]),
                excite: conv1x1([hidden, self.channels]),
            },
            spatial: SpatialAttention {
                conv: Conv2dConfig::new([2, 1], [self.kernel_size, self.kernel_size])
                    .with_padding(PaddingConfig2d::Explicit(
                        self.kernel_size / 2,
                        self.kernel_size / 2,
                    ))
                    .with_initializer(conv_init.initializer())
                    .init(device),
            },
            residual: self.residual,
        }
    }
}

/// Channel gate from a bottleneck shared by the average- and max-pooled
/// descriptors.
#[derive(Module, Debug)]
pub struct ChannelAttention<B: Backend> {
    pub(crate) squeeze: Conv2d<B>,
    pub(crate) excite: Conv2d<B>,
}

impl<B: Backend> ChannelAttention<B> {
    /// Returns the `[batch, channels, 1, 1]` gate.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let max = x.clone().max_dim(3).max_dim(2);
        let avg = x.mean_dim(3).mean_dim(2);

        sigmoid(self.mlp(max) + self.mlp(avg))
    }

    fn mlp(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.excite.forward(relu(self.squeeze.forward(x)))
    }
}

/// Spatial gate from the channel-wise max and mean maps.
#[derive(Module, Debug)]
pub struct SpatialAttention<B: Backend> {
    pub(crate) conv: Conv2d<B>,
}

impl<B: Backend> SpatialAttention<B> {
    /// Returns the `[batch, 1, height, width]` gate.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let max = x.clone().max_dim(1);
        let avg = x.mean_dim(1);

        sigmoid(self.conv.forward(Tensor::cat(vec![max, avg], 1)))
    }
}

/// Channel then spatial attention.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct Cbam<B: Backend> {
    pub(crate) channel: ChannelAttention<B>,
    pub(crate) spatial: SpatialAttention<B>,
    residual: bool,
}

impl<B: Backend> Cbam<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = x.clone() * self.channel.forward(x.clone());
        let out = out.clone() * self.spatial.forward(out);

        if self.residual {
            out + x
        } else {
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn cbam_preserves_shape() {
        let device = Default::default();
        let cbam = CbamConfig::new()
            .with_channels(48)
            .with_kernel_size(7)
            .init::<TestBackend>(&ConvInit::KaimingNormal, &device);

        assert_eq!(cbam.channel.squeeze.weight.dims(), [3, 48, 1, 1]);
        assert_eq!(cbam.channel.excite.weight.dims(), [48, 3, 1, 1]);
        assert_eq!(cbam.spatial.conv.weight.dims(), [1, 2, 7, 7]);

        let x = Tensor::<TestBackend, 4>::random([2, 48, 5, 7], Distribution::Default, &device);
        assert_eq!(cbam.forward(x).dims(), [2, 48, 5, 7]);
    }

    #[test]
    fn narrow_input_keeps_one_hidden_channel() {
        let device = Default::default();
        let cbam = CbamConfig::new()
            .with_channels(4)
            .init::<TestBackend>(&ConvInit::KaimingNormal, &device);

        assert_eq!(cbam.channel.squeeze.weight.dims(), [1, 4, 1, 1]);
    }

    #[test]
    fn gates_are_in_unit_interval() {
        let device = Default::default();
        let cbam = CbamConfig::new()
            .with_channels(8)
            .with_reduction(2)
            .with_kernel_size(3)
            .init::<TestBackend>(&ConvInit::KaimingNormal, &device);
        let x = Tensor::<TestBackend, 4>::random(
            [1, 8, 4, 4],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let channel = cbam.channel.forward(x.clone());
        assert_eq!(channel.dims(), [1, 8, 1, 1]);
        let spatial = cbam.spatial.forward(x);
        assert_eq!(spatial.dims(), [1, 1, 4, 4]);

        for gate in [channel.flatten::<1>(0, 3), spatial.flatten::<1>(0, 3)] {
            assert!(gate.clone().min().into_scalar() >= 0.0);
            assert!(gate.max().into_scalar() <= 1.0);
        }
    }

    #[test]
    fn residual_can_be_disabled() {
        let device = Default::default();
        let cbam = CbamConfig::new()
            .with_channels(4)
            .with_kernel_size(3)
            .with_residual(false)
            .init::<TestBackend>(&ConvInit::KaimingNormal, &device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 3, 3], &device);

        // zero features stay zero under a multiplicative gate
        let out = cbam.forward(x).abs().max().into_scalar();
        assert!(out.abs() < f32::EPSILON);
    }
}
