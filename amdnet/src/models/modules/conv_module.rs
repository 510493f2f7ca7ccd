//! # Convolution Module
//!
//! A convolution followed by an optional normalization and an optional
//! activation. This is the unit every other block in the backbone is made of.

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation,
};

use crate::{
    config::{ActivationConfig, NormConfig},
    error::{AmdNetError, AmdNetResult},
    init::LayerInitConfig,
};

/// Configuration for the `ConvModule` module.
#[derive(Config, Debug)]
pub struct ConvModuleConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    #[config(default = "0")]
    pub padding: usize,
    #[config(default = "1")]
    pub dilation: usize,
    /// `None` adds a bias only when there is no normalization.
    #[config(default = "None")]
    pub bias: Option<bool>,
    #[config(default = "NormConfig::Batch")]
    pub norm: NormConfig,
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub act: Option<ActivationConfig>,
    #[config(default = "LayerInitConfig::new()")]
    pub layer_init: LayerInitConfig,
}

impl ConvModuleConfig {
    /// Initializes a new `ConvModule`.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::InvalidConfiguration` if group normalization cannot
    /// split `out_channels` evenly.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AmdNetResult<ConvModule<B>> {
        let norm = NormLayer::new(&self.norm, self.out_channels, &self.layer_init, device)?;
        let bias = self.bias.unwrap_or(norm.is_none());

        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_dilation([self.dilation, self.dilation])
        .with_bias(bias)
        .with_initializer(self.layer_init.conv.initializer())
        .init(device);

        Ok(ConvModule {
            conv,
            norm,
            act: Ignored(self.act.clone()),
            frozen_stats: false,
        })
    }
}

/// Convolution, normalization and activation.
///
/// When `frozen_stats` is set, a batch norm normalizes with its running
/// statistics and never updates them, regardless of the backend.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, out_channels, height', width']`
#[derive(Module, Debug)]
pub struct ConvModule<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: Option<NormLayer<B>>,
    act: Ignored<Option<ActivationConfig>>,
    frozen_stats: bool,
}

impl<B: Backend> ConvModule<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.norm {
            Some(norm) => norm.forward(x, self.frozen_stats),
            None => x,
        };
        match &*self.act {
            Some(act) => act.forward(x),
            None => x,
        }
    }

    pub(crate) fn set_frozen_stats(&mut self, frozen: bool) {
        self.frozen_stats = frozen;
    }

    pub const fn frozen_stats(&self) -> bool {
        self.frozen_stats
    }
}

/// An enum to wrap the supported normalization layers.
#[derive(Module, Debug)]
pub enum NormLayer<B: Backend> {
    Batch(BatchNorm<B, 2>),
    Group(GroupNorm<B>),
}

impl<B: Backend> NormLayer<B> {
    /// Builds the normalization layer for `channels` outputs, or `None` for
    /// `NormConfig::None`. Scale and shift start at the constants of `init`.
    fn new(
        config: &NormConfig,
        channels: usize,
        init: &LayerInitConfig,
        device: &Device<B>,
    ) -> AmdNetResult<Option<Self>> {
        match config {
            NormConfig::Batch => {
                let mut bn = BatchNormConfig::new(channels).init(device);
                let (gamma, beta) = init.norm_affine(channels, device);
                bn.gamma = gamma;
                bn.beta = beta;
                Ok(Some(Self::Batch(bn)))
            }
            NormConfig::Group(groups) => {
                if *groups == 0 || channels % groups != 0 {
                    return Err(AmdNetError::InvalidConfiguration {
                        reason: format!("{channels} channels cannot be split into {groups} groups"),
                    });
                }
                let mut gn = GroupNormConfig::new(*groups, channels).init(device);
                let (gamma, beta) = init.norm_affine(channels, device);
                gn.gamma = Some(gamma);
                gn.beta = Some(beta);
                Ok(Some(Self::Group(gn)))
            }
            NormConfig::None => Ok(None),
        }
    }

    fn forward(&self, x: Tensor<B, 4>, frozen_stats: bool) -> Tensor<B, 4> {
        match self {
            Self::Batch(bn) if frozen_stats => batch_norm_frozen(bn, x),
            Self::Batch(bn) => bn.forward(x),
            Self::Group(gn) => gn.forward(x),
        }
    }
}

/// Batch normalization with the running statistics, as in evaluation mode.
///
/// Gradients still reach `gamma` and `beta`; the running mean and variance are
/// read but never updated.
fn batch_norm_frozen<B: Backend>(bn: &BatchNorm<B, 2>, x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, channels, _, _] = x.dims();
    let shape = [1, channels, 1, 1];

    let mean = bn.running_mean.value().reshape(shape);
    let std = bn
        .running_var
        .value()
        .add_scalar(bn.epsilon)
        .sqrt()
        .reshape(shape);
    let gamma = bn.gamma.val().reshape(shape);
    let beta = bn.beta.val().reshape(shape);

    (x - mean) / std * gamma + beta
}

impl ActivationConfig {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => activation::relu(x),
            Self::LeakyRelu(slope) => activation::leaky_relu(x, *slope),
            Self::Gelu => activation::gelu(x),
            Self::Silu => activation::silu(x),
        }
    }
}
