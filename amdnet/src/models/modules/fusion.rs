//! # Encoder Feature Fusion
//!
//! Before an encoder stage runs, every shallower stage output is max-pooled to
//! the stage's input resolution and concatenated. The stack is gated by an
//! attention block and projected by a 1x1 `ConvModule` to the width the stage
//! expects.

use burn::prelude::*;
use burn_extra_ops::{CeilMaxPool2d, CeilMaxPool2dConfig};

use super::{
    cbam::Cbam,
    conv_module::{ConvModule, ConvModuleConfig},
    se_layer::SeLayer,
};
use crate::{
    config::{ActivationConfig, FusionAttention, NormConfig},
    error::{AmdNetError, AmdNetResult},
    init::LayerInitConfig,
};

/// Configuration for the `FusionBlock` module.
#[derive(Config, Debug)]
pub struct FusionBlockConfig {
    /// Channel width of every source stage, shallowest first.
    pub source_channels: Vec<usize>,
    /// Max-pool factor of every source stage. A factor of 1 skips pooling.
    pub pool_factors: Vec<usize>,
    /// Width of the projected output.
    pub out_channels: usize,
    #[config(default = "FusionAttention::default()")]
    pub attention: FusionAttention,
    #[config(default = "None")]
    pub conv_bias: Option<bool>,
    #[config(default = "NormConfig::Batch")]
    pub norm: NormConfig,
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub act: Option<ActivationConfig>,
    #[config(default = "LayerInitConfig::new()")]
    pub layer_init: LayerInitConfig,
}

impl FusionBlockConfig {
    /// Total width of the concatenated sources.
    pub fn in_channels(&self) -> usize {
        self.source_channels.iter().sum()
    }

    /// Initializes a new `FusionBlock`.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::InvalidConfiguration` if the sources and pool factors
    /// disagree, and propagates layer construction errors.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AmdNetResult<FusionBlock<B>> {
        if self.source_channels.is_empty()
            || self.source_channels.len() != self.pool_factors.len()
            || self.pool_factors.contains(&0)
        {
            return Err(AmdNetError::InvalidConfiguration {
                reason: format!(
                    "fusion sources {:?} do not match pool factors {:?}",
                    self.source_channels, self.pool_factors
                ),
            });
        }

        let in_channels = self.in_channels();
        let pools = self
            .pool_factors
            .iter()
            .map(|&factor| (factor > 1).then(|| CeilMaxPool2dConfig::new(factor).init()))
            .collect();

        let attention = match &self.attention {
            FusionAttention::Cbam(cbam) => Some(AttentionBlock::Cbam(
                cbam.clone()
                    .with_channels(in_channels)
                    .init(&self.layer_init.conv, device),
            )),
            FusionAttention::SqueezeExcitation(se) => Some(AttentionBlock::SqueezeExcitation(
                se.clone()
                    .with_channels(in_channels)
                    .init(&self.layer_init, device)?,
            )),
            FusionAttention::None => None,
        };

        let project = ConvModuleConfig::new(in_channels, self.out_channels)
            .with_kernel_size(1)
            .with_bias(self.conv_bias)
            .with_norm(self.norm.clone())
            .with_act(self.act.clone())
            .with_layer_init(self.layer_init.clone())
            .init(device)?;

        Ok(FusionBlock {
            pools,
            attention,
            project,
        })
    }
}

/// An enum to wrap the attention gates a fusion block can use.
#[derive(Module, Debug)]
pub enum AttentionBlock<B: Backend> {
    Cbam(Cbam<B>),
    SqueezeExcitation(SeLayer<B>),
}

impl<B: Backend> AttentionBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Cbam(cbam) => cbam.forward(x),
            Self::SqueezeExcitation(se) => se.forward(x),
        }
    }
}

/// Attention-gated fusion of all shallower encoder outputs.
///
/// # Shapes
///   - input: one `[batch_size, c_j, h_j, w_j]` tensor per source stage
///   - output: `[batch_size, out_channels, h, w]` at the target stage's input resolution
#[derive(Module, Debug)]
pub struct FusionBlock<B: Backend> {
    pools: Vec<Option<CeilMaxPool2d>>,
    pub(crate) attention: Option<AttentionBlock<B>>,
    pub(crate) project: ConvModule<B>,
}

impl<B: Backend> FusionBlock<B> {
    /// Fuses `sources`, which must hold one tensor per pool factor, in stage order.
    pub fn forward(&self, sources: &[Tensor<B, 4>]) -> Tensor<B, 4> {
        let pooled = sources
            .iter()
            .zip(&self.pools)
            .map(|(x, pool)| match pool {
                Some(pool) => pool.forward(x.clone()),
                None => x.clone(),
            })
            .collect();
        let x = Tensor::cat(pooled, 1);

        let x = match &self.attention {
            Some(attention) => attention.forward(x),
            None => x,
        };
        self.project.forward(x)
    }

    pub fn num_sources(&self) -> usize {
        self.pools.len()
    }

    pub(crate) fn set_frozen_stats(&mut self, frozen: bool) {
        self.project.set_frozen_stats(frozen);
        if let Some(AttentionBlock::SqueezeExcitation(se)) = &mut self.attention {
            se.conv1.set_frozen_stats(frozen);
            se.conv2.set_frozen_stats(frozen);
        }
    }

    pub fn conv_modules(&self) -> Vec<&ConvModule<B>> {
        let mut modules = vec![&self.project];
        if let Some(AttentionBlock::SqueezeExcitation(se)) = &self.attention {
            modules.push(&se.conv1);
            modules.push(&se.conv2);
        }
        modules
    }
}
