//! Building blocks of the AMDNet backbone.

mod basic_conv_block;
mod cbam;
mod conv_module;
mod fusion;
mod se_layer;

pub use basic_conv_block::{BasicConvBlock, BasicConvBlockConfig};
pub use cbam::{Cbam, CbamConfig, ChannelAttention, SpatialAttention};
pub use conv_module::{ConvModule, ConvModuleConfig, NormLayer};
pub use fusion::{AttentionBlock, FusionBlock, FusionBlockConfig};
pub use se_layer::{make_divisible, SeLayer, SeLayerConfig};
