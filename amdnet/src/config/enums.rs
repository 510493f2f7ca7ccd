//! Enumeration types for AMDNet configuration.
//!
//! Each enum is a closed set of layer choices; every variant maps to exactly one
//! constructor in `models::modules`.

use burn::{prelude::*, tensor::ops::InterpolateMode};

use crate::models::{CbamConfig, SeLayerConfig};

/// Normalization layer placed after each convolution of a `ConvModule`.
#[derive(Config, Debug, PartialEq)]
pub enum NormConfig {
    /// 2D batch normalization with running statistics.
    Batch,
    /// Group normalization with the given number of groups.
    Group(usize),
    /// No normalization; the convolution keeps its bias.
    None,
}

/// Activation placed after the normalization of a `ConvModule`.
#[derive(Config, Debug, PartialEq)]
pub enum ActivationConfig {
    Relu,
    /// Leaky ReLU with the given negative slope.
    LeakyRelu(f64),
    Gelu,
    Silu,
}

/// Defines how the decoder brings a coarse map up to the resolution of its skip.
///
/// Burn's backward pass for bilinear interpolation is not available on every
/// backend; `Nearest` works in both training and inference.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum UpsampleMode {
    /// Bilinear interpolation with aligned corners.
    Bilinear,
    /// Nearest-neighbour interpolation.
    Nearest,
}

impl UpsampleMode {
    pub const fn interpolate_mode(&self) -> InterpolateMode {
        match self {
            Self::Bilinear => InterpolateMode::Bilinear,
            Self::Nearest => InterpolateMode::Nearest,
        }
    }
}

impl Default for UpsampleMode {
    fn default() -> Self {
        Self::Bilinear
    }
}

/// Attention gate applied to the concatenated features inside each fusion block.
///
/// The `channels` field of the inner config is overwritten with the fused width
/// of the level the block belongs to.
#[derive(Config, Debug)]
pub enum FusionAttention {
    /// Channel then spatial attention with a residual connection.
    Cbam(CbamConfig),
    /// Squeeze-and-excitation channel gate.
    SqueezeExcitation(SeLayerConfig),
    /// Concatenated features go straight to the 1x1 projection.
    None,
}

impl Default for FusionAttention {
    fn default() -> Self {
        Self::Cbam(CbamConfig::new())
    }
}

/// Deformable convolution settings. Accepted by the configuration for
/// compatibility but rejected at construction.
#[derive(Config, Debug)]
pub struct DcnConfig {
    #[config(default = "1")]
    pub deform_groups: usize,
    #[config(default = "false")]
    pub fallback_on_stride: bool,
}

/// A plugin layer inserted into a convolution block. Rejected at construction.
#[derive(Config, Debug)]
pub struct PluginConfig {
    /// The plugin layer type.
    pub name: String,
    /// Where the plugin would be inserted, e.g. `after_conv1`.
    pub position: String,
}
