//! Core configuration structure for the AMDNet backbone.
//!
//! `AmdNetConfig` holds every construction parameter. Besides validation it
//! exposes the derived stage geometry (channel widths, resolution scales, pool
//! factors) so that callers and tests can reason about the network without
//! building it.

use std::path::PathBuf;

use burn::prelude::*;

use super::enums::{
    ActivationConfig, DcnConfig, FusionAttention, NormConfig, PluginConfig, UpsampleMode,
};
use crate::{
    error::{AmdNetError, AmdNetResult},
    init::{InitConfig, LayerInitConfig, WeightSource},
};

/// Largest supported stage count. Stage widths and the downsample rate double
/// with every stage.
pub const MAX_NUM_STAGES: usize = 16;

/// Main configuration for the AMDNet backbone.
#[derive(Config, Debug)]
pub struct AmdNetConfig {
    /// Number of input image channels.
    #[config(default = "3")]
    pub in_channels: usize,
    /// Output channels of the first stage. Stage `i` outputs `base_channels * 2^i`.
    #[config(default = "64")]
    pub base_channels: usize,
    /// Number of encoder stages.
    #[config(default = "5")]
    pub num_stages: usize,
    /// Stride of the first convolution of each encoder stage, 1 or 2.
    #[config(default = "vec![1, 1, 1, 1, 1]")]
    pub strides: Vec<usize>,
    /// Convolutions per encoder stage.
    #[config(default = "vec![2, 2, 2, 2, 2]")]
    pub enc_num_convs: Vec<usize>,
    /// Convolutions per decoder stage.
    #[config(default = "vec![2, 2, 2, 2]")]
    pub dec_num_convs: Vec<usize>,
    /// Whether stage `i + 1` max-pools its input. Ignored for stages with stride 2.
    #[config(default = "vec![true, true, true, true]")]
    pub downsamples: Vec<bool>,
    /// Dilation of every convolution but the first in each encoder stage.
    #[config(default = "vec![1, 1, 1, 1, 1]")]
    pub enc_dilations: Vec<usize>,
    /// Dilation of every convolution but the first in each decoder stage.
    #[config(default = "vec![1, 1, 1, 1]")]
    pub dec_dilations: Vec<usize>,
    /// Trace convolution blocks as checkpointed regions. Recomputation itself is
    /// chosen by the autodiff backend's checkpoint strategy, e.g.
    /// `Autodiff<B, BalancedCheckpointing>`; this flag does not change memory use.
    #[config(default = "false")]
    pub with_cp: bool,
    /// Convolution bias. `None` adds a bias only when there is no normalization.
    #[config(default = "None")]
    pub conv_bias: Option<bool>,
    #[config(default = "NormConfig::Batch")]
    pub norm: NormConfig,
    #[config(default = "Some(ActivationConfig::Relu)")]
    pub act: Option<ActivationConfig>,
    /// Interpolation used by the decoder.
    #[config(default = "UpsampleMode::Bilinear")]
    pub upsample: UpsampleMode,
    /// Attention gate inside each fusion block.
    #[config(default = "FusionAttention::default()")]
    pub attention: FusionAttention,
    /// Keep batch norms on their running statistics while training.
    #[config(default = "false")]
    pub norm_eval: bool,
    #[config(default = "None")]
    pub dcn: Option<DcnConfig>,
    #[config(default = "Vec::new()")]
    pub plugins: Vec<PluginConfig>,
    /// Deprecated checkpoint path, use `init` instead.
    #[config(default = "None")]
    pub pretrained: Option<String>,
    /// Structured initialization.
    #[config(default = "None")]
    pub init: Option<InitConfig>,
}

impl AmdNetConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::InvalidPretrainedType` if `pretrained` is present but
    /// neither a string nor null, and `AmdNetError::InvalidConfiguration` for any
    /// other malformed document.
    pub fn from_json(json: &str) -> AmdNetResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| AmdNetError::InvalidConfiguration {
                reason: format!("malformed configuration: {e}"),
            })?;

        if let Some(pretrained) = value.get("pretrained") {
            if !(pretrained.is_null() || pretrained.is_string()) {
                return Err(AmdNetError::InvalidPretrainedType {
                    found: json_kind(pretrained),
                });
            }
        }

        serde_json::from_value(value).map_err(|e| AmdNetError::InvalidConfiguration {
            reason: format!("malformed configuration: {e}"),
        })
    }

    /// Validate the configuration and return appropriate errors for invalid settings.
    ///
    /// # Errors
    ///
    /// - `AmdNetError::SequenceLength` if a per-stage sequence has the wrong length.
    /// - `AmdNetError::ConflictingInitialization` if both `pretrained` and `init` are set.
    /// - `AmdNetError::Unimplemented` if deformable convolution or plugins are requested.
    /// - `AmdNetError::InvalidConfiguration` for out-of-range values.
    pub fn validate(&self) -> AmdNetResult<()> {
        if self.pretrained.is_some() && self.init.is_some() {
            return Err(AmdNetError::ConflictingInitialization);
        }
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
        if self.num_stages == 0 {
            return Err(AmdNetError::InvalidConfiguration {
                reason: "num_stages must be at least 1".to_owned(),
            });
        }
        if self.in_channels == 0 || self.base_channels == 0 {
            return Err(AmdNetError::InvalidConfiguration {
                reason: format!(
                    "channel counts must be positive, got in_channels={} and base_channels={}",
                    self.in_channels, self.base_channels
                ),
            });
        }
        if self.num_stages > MAX_NUM_STAGES {
            return Err(AmdNetError::InvalidConfiguration {
                reason: format!(
                    "num_stages must be at most {MAX_NUM_STAGES}, got {}",
                    self.num_stages
                ),
            });
        }
        // The widest stage is `base_channels << (num_stages - 1)` and the fusion and
        // decoder inputs add up to less than twice that.
        if self.base_channels.checked_mul(1 << self.num_stages).is_none() {
            return Err(AmdNetError::InvalidConfiguration {
                reason: format!(
                    "base_channels={} is too large for {} stages",
                    self.base_channels, self.num_stages
                ),
            });
        }

        let n = self.num_stages;
        check_len("strides", "num_stages", &self.strides, n, n)?;
        check_len("enc_num_convs", "num_stages", &self.enc_num_convs, n, n)?;
        check_len("dec_num_convs", "(num_stages-1)", &self.dec_num_convs, n - 1, n)?;
        check_len("downsamples", "(num_stages-1)", &self.downsamples, n - 1, n)?;
        check_len("enc_dilations", "num_stages", &self.enc_dilations, n, n)?;
        check_len("dec_dilations", "(num_stages-1)", &self.dec_dilations, n - 1, n)?;

        if let Some(stride) = self.strides.iter().find(|&&s| s != 1 && s != 2) {
            return Err(AmdNetError::InvalidConfiguration {
                reason: format!("strides must be 1 or 2, got {stride} in {:?}", self.strides),
            });
        }
        if self.enc_num_convs.contains(&0) || self.dec_num_convs.contains(&0) {
            return Err(AmdNetError::InvalidConfiguration {
                reason: "every stage needs at least one convolution".to_owned(),
            });
        }
        if self.enc_dilations.contains(&0) || self.dec_dilations.contains(&0) {
            return Err(AmdNetError::InvalidConfiguration {
                reason: "dilation rates must be positive".to_owned(),
            });
        }

        if let NormConfig::Group(groups) = self.norm {
            if let Some(width) = self
                .stage_channels()
                .into_iter()
                .find(|&c| groups == 0 || c % groups != 0)
            {
                return Err(AmdNetError::InvalidConfiguration {
                    reason: format!("{width} channels cannot be split into {groups} groups"),
                });
            }
        }

        match &self.attention {
            FusionAttention::Cbam(cbam) if cbam.kernel_size % 2 == 0 => {
                return Err(AmdNetError::InvalidConfiguration {
                    reason: format!(
                        "spatial attention kernel must be odd, got {}",
                        cbam.kernel_size
                    ),
                });
            }
            FusionAttention::Cbam(cbam) if cbam.reduction == 0 => {
                return Err(AmdNetError::InvalidConfiguration {
                    reason: "channel attention reduction must be positive".to_owned(),
                });
            }
            FusionAttention::SqueezeExcitation(se) if se.ratio == 0 => {
                return Err(AmdNetError::InvalidConfiguration {
                    reason: "squeeze-excitation ratio must be positive".to_owned(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    /// Resolves the legacy `pretrained` path and the structured `init` into a
    /// single weight source.
    ///
    /// Using `pretrained` logs a deprecation warning and is treated as
    /// `InitConfig::Pretrained`.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::ConflictingInitialization` if both are set.
    pub fn weight_source(&self) -> AmdNetResult<WeightSource> {
        match (&self.pretrained, &self.init) {
            (Some(_), Some(_)) => Err(AmdNetError::ConflictingInitialization),
            (Some(path), None) => {
                tracing::warn!(
                    pretrained = %path,
                    "DeprecationWarning: pretrained is deprecated, please use init instead"
                );
                Ok(WeightSource::Checkpoint(PathBuf::from(path)))
            }
            (None, Some(InitConfig::Pretrained(path))) => {
                Ok(WeightSource::Checkpoint(path.clone()))
            }
            (None, Some(InitConfig::Layers(layers))) => Ok(WeightSource::Layers(layers.clone())),
            (None, None) => Ok(WeightSource::Layers(LayerInitConfig::new())),
        }
    }

    /// Output channels of every encoder stage, `base_channels * 2^i`.
    pub fn stage_channels(&self) -> Vec<usize> {
        (0..self.num_stages)
            .map(|i| self.base_channels << i)
            .collect()
    }

    /// Input channels of every encoder stage: the image for stage 0, the previous
    /// stage's width afterwards.
    pub fn encoder_in_channels(&self) -> Vec<usize> {
        (0..self.num_stages)
            .map(|i| {
                if i == 0 {
                    self.in_channels
                } else {
                    self.base_channels << (i - 1)
                }
            })
            .collect()
    }

    /// Concatenated input width of the fusion block feeding stage `i`, for `i >= 1`.
    pub fn fusion_in_channels(&self) -> Vec<usize> {
        let channels = self.stage_channels();
        (1..self.num_stages)
            .map(|i| channels[..i].iter().sum())
            .collect()
    }

    /// Input width of decoder stage `i`: its skip plus the coarser map.
    pub fn decoder_in_channels(&self) -> Vec<usize> {
        self.stage_channels()
            .windows(2)
            .map(|pair| pair[0] + pair[1])
            .collect()
    }

    /// Whether stage `i` max-pools its input. Stage 0 never does, and a stage
    /// with a strided first convolution never does.
    pub fn pools_before(&self) -> Vec<bool> {
        (0..self.num_stages)
            .map(|i| {
                i > 0
                    && self.downsamples.get(i - 1).copied().unwrap_or(false)
                    && self.strides.get(i).copied().unwrap_or(1) != 2
            })
            .collect()
    }

    /// Downsampling factor of every stage's output relative to the input image.
    pub fn stage_scales(&self) -> Vec<usize> {
        let pools = self.pools_before();
        let mut scale = 1;
        (0..self.num_stages)
            .map(|i| {
                if pools[i] {
                    scale *= 2;
                }
                scale *= self.strides.get(i).copied().unwrap_or(1);
                scale
            })
            .collect()
    }

    /// Max-pool factors that bring each shallower stage `j < i` to the input
    /// resolution of stage `i`. A factor of 1 means the source is used as is.
    pub fn fusion_pool_factors(&self, stage: usize) -> Vec<usize> {
        if stage == 0 || stage >= self.num_stages {
            return Vec::new();
        }
        let scales = self.stage_scales();
        let pool = if self.pools_before()[stage] { 2 } else { 1 };
        let target = scales[stage - 1] * pool;

        scales[..stage].iter().map(|&s| target / s).collect()
    }

    /// The factor by which the input height and width must be divisible.
    pub fn whole_downsample_rate(&self) -> usize {
        (1..self.num_stages)
            .filter(|&i| {
                self.strides.get(i) == Some(&2)
                    || self.downsamples.get(i - 1).copied().unwrap_or(false)
            })
            .fold(1, |rate, _| rate * 2)
    }
}

fn check_len<T: core::fmt::Debug>(
    name: &'static str,
    expected_label: &'static str,
    values: &[T],
    expected: usize,
    num_stages: usize,
) -> AmdNetResult<()> {
    if values.len() == expected {
        return Ok(());
    }
    Err(AmdNetError::SequenceLength {
        name,
        expected_label,
        expected,
        actual: values.len(),
        values: format!("{values:?}"),
        num_stages,
    })
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
