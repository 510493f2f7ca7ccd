//! # AMDNet Model Implementation
//!
//! This module defines the `AmdNet` backbone: an encoder pyramid whose stages are
//! fed by attention-gated fusion of every shallower stage, and a top-down decoder
//! that upsamples, concatenates the matching skip and convolves at each level.
//!
//! ## Core Components
//!
//! - `AmdNetConfig::init`: validates the configuration, builds every block and
//!   resolves the weight source.
//! - `AmdNet`: the model. `forward` returns one feature map per stage, coarsest
//!   first.
//! - `StageGeometry`: per-stage widths and scales fixed at construction.

use burn::{
    module::Ignored,
    prelude::*,
    tensor::{module::interpolate, ops::InterpolateOptions},
};

use super::modules::{
    BasicConvBlock, BasicConvBlockConfig, ConvModule, FusionBlock, FusionBlockConfig,
};
use crate::{
    config::{AmdNetConfig, UpsampleMode},
    error::{AmdNetError, AmdNetResult},
    init::WeightSource,
    weights,
};

/// Per-stage shape bookkeeping of a built backbone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGeometry {
    /// Input image channels.
    pub in_channels: usize,
    /// Output width of every stage, finest first.
    pub channels: Vec<usize>,
    /// Downsampling factor of every stage's output relative to the input.
    pub scales: Vec<usize>,
    /// The factor the input height and width must be divisible by.
    pub whole_downsample_rate: usize,
    pub strides: Vec<usize>,
    pub downsamples: Vec<bool>,
}

impl StageGeometry {
    fn from_config(config: &AmdNetConfig) -> Self {
        Self {
            in_channels: config.in_channels,
            channels: config.stage_channels(),
            scales: config.stage_scales(),
            whole_downsample_rate: config.whole_downsample_rate(),
            strides: config.strides.clone(),
            downsamples: config.downsamples.clone(),
        }
    }

    pub fn num_stages(&self) -> usize {
        self.channels.len()
    }
}

impl AmdNetConfig {
    /// Initializes an `AmdNet` backbone with this configuration.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the model on.
    ///
    /// # Errors
    ///
    /// Returns the validation errors of `AmdNetConfig::validate`, block
    /// construction errors, and checkpoint loading errors when the weight source
    /// is a checkpoint.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AmdNetResult<AmdNet<B>> {
        self.validate()?;
        let source = self.weight_source()?;
        let layer_init = source.layer_init();

        let geometry = StageGeometry::from_config(self);
        let channels = &geometry.channels;
        tracing::debug!(
            num_stages = self.num_stages,
            channels = ?channels,
            scales = ?geometry.scales,
            whole_downsample_rate = geometry.whole_downsample_rate,
            "building AMDNet backbone"
        );

        let encoder = self
            .encoder_in_channels()
            .into_iter()
            .enumerate()
            .map(|(i, in_channels)| {
                BasicConvBlockConfig::new(in_channels, channels[i])
                    .with_num_convs(self.enc_num_convs[i])
                    .with_stride(self.strides[i])
                    .with_dilation(self.enc_dilations[i])
                    .with_with_cp(self.with_cp)
                    .with_conv_bias(self.conv_bias)
                    .with_norm(self.norm.clone())
                    .with_act(self.act.clone())
                    .with_layer_init(layer_init.clone())
                    .with_dcn(self.dcn.clone())
                    .with_plugins(self.plugins.clone())
                    .init(device)
            })
            .collect::<AmdNetResult<Vec<_>>>()?;

        let fusion = (1..self.num_stages)
            .map(|i| {
                FusionBlockConfig::new(
                    channels[..i].to_vec(),
                    self.fusion_pool_factors(i),
                    channels[i - 1],
                )
                .with_attention(self.attention.clone())
                .with_conv_bias(self.conv_bias)
                .with_norm(self.norm.clone())
                .with_act(self.act.clone())
                .with_layer_init(layer_init.clone())
                .init(device)
            })
            .collect::<AmdNetResult<Vec<_>>>()?;

        let decoder = self
            .decoder_in_channels()
            .into_iter()
            .enumerate()
            .map(|(i, in_channels)| {
                BasicConvBlockConfig::new(in_channels, channels[i])
                    .with_num_convs(self.dec_num_convs[i])
                    .with_dilation(self.dec_dilations[i])
                    .with_with_cp(self.with_cp)
                    .with_conv_bias(self.conv_bias)
                    .with_norm(self.norm.clone())
                    .with_act(self.act.clone())
                    .with_layer_init(layer_init.clone())
                    .init(device)
            })
            .collect::<AmdNetResult<Vec<_>>>()?;

        let mut model = AmdNet {
            encoder,
            fusion,
            decoder,
            upsample: Ignored(self.upsample.clone()),
            norm_eval: self.norm_eval,
            training: true,
            geometry: Ignored(geometry),
        };
        model.set_frozen_stats(model.norm_eval);

        match source {
            WeightSource::Checkpoint(path) => weights::load_checkpoint(model, &path, device),
            WeightSource::Layers(_) => Ok(model),
        }
    }
}

/// The AMDNet backbone.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `num_stages` tensors, stage `N-1` first, each
///     `[batch_size, channels[i], height / scales[i], width / scales[i]]`
#[derive(Module, Debug)]
pub struct AmdNet<B: Backend> {
    pub(crate) encoder: Vec<BasicConvBlock<B>>,
    /// `fusion[k]` builds the input of encoder stage `k + 1`.
    pub(crate) fusion: Vec<FusionBlock<B>>,
    pub(crate) decoder: Vec<BasicConvBlock<B>>,
    upsample: Ignored<UpsampleMode>,
    norm_eval: bool,
    training: bool,
    geometry: Ignored<StageGeometry>,
}

impl<B: Backend> AmdNet<B> {
    /// Runs the encoder and decoder.
    ///
    /// # Errors
    ///
    /// Returns `AmdNetError::InvalidTensorShape` if the channel count differs from
    /// `in_channels`, and `AmdNetError::IndivisibleInput` if the height or width is
    /// not divisible by the whole downsample rate. Both are checked before any
    /// convolution runs.
    pub fn forward(&self, x: Tensor<B, 4>) -> AmdNetResult<Vec<Tensor<B, 4>>> {
        self.check_input(&x)?;

        let Some((stem, stages)) = self.encoder.split_first() else {
            return Err(AmdNetError::InvalidConfiguration {
                reason: "backbone has no encoder stages".to_owned(),
            });
        };

        let mut features = Vec::with_capacity(self.encoder.len());
        features.push(stem.forward(x));
        for (stage, fusion) in stages.iter().zip(&self.fusion) {
            let fused = fusion.forward(&features);
            features.push(stage.forward(fused));
        }

        let mut outs = Vec::with_capacity(features.len());
        let Some(mut prev) = features.pop() else {
            return Ok(outs);
        };
        outs.push(prev.clone());

        for (skip, block) in features.into_iter().zip(&self.decoder).rev() {
            let up = self.upsample_like(prev, &skip);
            prev = block.forward(Tensor::cat(vec![skip, up], 1));
            outs.push(prev.clone());
        }

        Ok(outs)
    }

    /// Switches between training and evaluation.
    ///
    /// Batch norms are frozen to their running statistics in evaluation, and in
    /// training as well when `norm_eval` is set. Frozen layers still pass
    /// gradients to their scale and shift.
    pub fn train(mut self, mode: bool) -> Self {
        self.training = mode;
        self.set_frozen_stats(!mode || self.norm_eval);
        self
    }

    pub const fn is_training(&self) -> bool {
        self.training
    }

    pub const fn norm_eval(&self) -> bool {
        self.norm_eval
    }

    pub fn geometry(&self) -> &StageGeometry {
        &self.geometry
    }

    pub fn num_fusion_blocks(&self) -> usize {
        self.fusion.len()
    }

    pub fn num_decoder_blocks(&self) -> usize {
        self.decoder.len()
    }

    fn set_frozen_stats(&mut self, frozen: bool) {
        for block in self.encoder.iter_mut().chain(self.decoder.iter_mut()) {
            block.set_frozen_stats(frozen);
        }
        for block in &mut self.fusion {
            block.set_frozen_stats(frozen);
        }
    }

    /// Every `ConvModule` in the backbone.
    pub fn conv_modules(&self) -> Vec<&ConvModule<B>> {
        let mut modules: Vec<_> = self
            .encoder
            .iter()
            .chain(&self.decoder)
            .flat_map(BasicConvBlock::conv_modules)
            .collect();
        modules.extend(self.fusion.iter().flat_map(FusionBlock::conv_modules));
        modules
    }

    fn check_input(&self, x: &Tensor<B, 4>) -> AmdNetResult<()> {
        let [batch, channels, height, width] = x.dims();
        let geometry = &*self.geometry;

        if channels != geometry.in_channels {
            return Err(AmdNetError::InvalidTensorShape {
                expected: format!("[batch_size, {}, height, width]", geometry.in_channels),
                actual: format!("[{batch}, {channels}, {height}, {width}]"),
            });
        }

        let rate = geometry.whole_downsample_rate;
        if height % rate != 0 || width % rate != 0 {
            return Err(AmdNetError::IndivisibleInput {
                height,
                width,
                rate,
                num_stages: geometry.num_stages(),
                strides: format!("{:?}", geometry.strides),
                downsamples: format!("{:?}", geometry.downsamples),
            });
        }

        Ok(())
    }

    /// Resizes `x` to the spatial size of `target`.
    fn upsample_like(&self, x: Tensor<B, 4>, target: &Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = target.dims();
        let [_, _, h, w] = x.dims();
        if h == height && w == width {
            return x;
        }

        interpolate(
            x,
            [height, width],
            InterpolateOptions::new(self.upsample.interpolate_mode()),
        )
    }
}
