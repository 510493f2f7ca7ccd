//! # Basic Convolution Block
//!
//! A stack of 3x3 `ConvModule`s. Only the first convolution is strided, and every
//! convolution after the first is dilated.

use burn::prelude::*;
use burn_extra_ops::checkpoint;

use super::conv_module::{ConvModule, ConvModuleConfig};
use crate::{
    config::{ActivationConfig, DcnConfig, NormConfig, PluginConfig},
    error::{AmdNetError, AmdNetResult},
    init::LayerInitConfig,
};

/// Configuration for the `BasicConvBlock` module.
#[derive(Config, Debug)]
pub struct BasicConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "2")]
    pub num_convs: usize,
    /// Stride of the first convolution, 1 or 2.
    #[config(default = "1")]
    pub stride: usize,
    /// Dilation of every convolution but the first.
    #[config(default = "1")]
    pub dilation: usize,
    /// Wrap the forward pass in a `checkpoint` trace span. Recomputation comes
    /// from the autodiff backend's checkpoint strategy, not from this flag.
    #[config(default = "false")]
    pub with_cp: bool,
    #[config(default = "None")]
    pub conv_bias: Option<bool>,
    #[config(default = "NormConfig::Batch")]
    pub norm: NormConfig,
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub act: Option<ActivationConfig>,
    #[config(default = "LayerInitConfig::new()")]
    pub layer_init: LayerInitConfig,
    #[config(default = "None")]
    pub dcn: Option<DcnConfig>,
    #[config(default = "Vec::new()")]
    pub plugins: Vec<PluginConfig>,
}

impl BasicConvBlockConfig {
    /// Initializes a new `BasicConvBlock`.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::Unimplemented` if deformable convolution or plugins
    /// are requested, and propagates `ConvModule` construction errors.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AmdNetResult<BasicConvBlock<B>> {
        if self.dcn.is_some() {
            return Err(AmdNetError::Unimplemented {
                feature: "deformable convolution",
            });
        }
        if !self.plugins.is_empty() {
            return Err(AmdNetError::Unimplemented {
                feature: "convolution plugins",
            });
        }

        let convs = (0..self.num_convs)
            .map(|i| {
                let (in_channels, stride, dilation) = if i == 0 {
                    (self.in_channels, self.stride, 1)
                } else {
                    (self.out_channels, 1, self.dilation)
                };
                ConvModuleConfig::new(in_channels, self.out_channels)
                    .with_kernel_size(3)
                    .with_stride(stride)
                    .with_dilation(dilation)
                    .with_padding(dilation)
                    .with_bias(self.conv_bias)
                    .with_norm(self.norm.clone())
                    .with_act(self.act.clone())
                    .with_layer_init(self.layer_init.clone())
                    .init(device)
            })
            .collect::<AmdNetResult<Vec<_>>>()?;

        Ok(BasicConvBlock {
            convs,
            with_cp: self.with_cp,
        })
    }
}

/// Sequential 3x3 convolutions.
///
/// With `with_cp`, the stack is traced as a checkpointed region whenever its
/// input is tracked by autodiff. The computation is the same either way; whether
/// activations are stored or recomputed is decided by the backend, e.g.
/// `Autodiff<B, BalancedCheckpointing>`.
#[derive(Module, Debug)]
pub struct BasicConvBlock<B: Backend> {
    pub(crate) convs: Vec<ConvModule<B>>,
    with_cp: bool,
}

impl<B: Backend> BasicConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.with_cp {
            checkpoint(|x| self.forward_convs(x), x)
        } else {
            self.forward_convs(x)
        }
    }

    fn forward_convs(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.convs.iter().fold(x, |x, conv| conv.forward(x))
    }

    pub(crate) fn set_frozen_stats(&mut self, frozen: bool) {
        for conv in &mut self.convs {
            conv.set_frozen_stats(frozen);
        }
    }

    pub fn conv_modules(&self) -> impl Iterator<Item = &ConvModule<B>> {
        self.convs.iter()
    }
}
