//! # Weight Initialization
//!
//! The backbone's parameters come from exactly one `WeightSource`: either the
//! layer initializers described by a `LayerInitConfig`, or a checkpoint file that
//! overwrites every parameter after construction.

use core::f64::consts::SQRT_2;
use std::path::PathBuf;

use burn::{module::Param, nn::Initializer, prelude::*};

/// Initializer for convolution weights.
#[derive(Config, Debug, PartialEq, Eq, Hash)]
pub enum ConvInit {
    /// Variance scaling for rectified activations, normal distribution, fan-out mode.
    KaimingNormal,
    /// Variance scaling for rectified activations, uniform distribution, fan-out mode.
    KaimingUniform,
    XavierNormal,
    XavierUniform,
}

impl ConvInit {
    pub const fn initializer(&self) -> Initializer {
        match self {
            Self::KaimingNormal => Initializer::KaimingNormal {
                gain: SQRT_2,
                fan_out_only: true,
            },
            Self::KaimingUniform => Initializer::KaimingUniform {
                gain: SQRT_2,
                fan_out_only: true,
            },
            Self::XavierNormal => Initializer::XavierNormal { gain: 1.0 },
            Self::XavierUniform => Initializer::XavierUniform { gain: 1.0 },
        }
    }
}

/// Per-layer initialization used when no checkpoint is loaded.
#[derive(Config, Debug)]
pub struct LayerInitConfig {
    /// Initializer for every convolution weight.
    #[config(default = "ConvInit::KaimingNormal")]
    pub conv: ConvInit,
    /// Constant for the scale of every batch and group norm.
    #[config(default = "1.0")]
    pub norm_scale: f64,
    /// Constant for the shift of every batch and group norm.
    #[config(default = "0.0")]
    pub norm_bias: f64,
}

impl LayerInitConfig {
    /// Creates the constant `(scale, shift)` parameters of a norm layer.
    pub(crate) fn norm_affine<B: Backend>(
        &self,
        channels: usize,
        device: &Device<B>,
    ) -> (Param<Tensor<B, 1>>, Param<Tensor<B, 1>>) {
        (
            Param::from_tensor(Tensor::full([channels], self.norm_scale, device)),
            Param::from_tensor(Tensor::full([channels], self.norm_bias, device)),
        )
    }
}

/// Structured initialization choice of the backbone.
#[derive(Config, Debug)]
pub enum InitConfig {
    /// Initialize every layer from scratch.
    Layers(LayerInitConfig),
    /// Load a checkpoint file after construction.
    Pretrained(PathBuf),
}

/// Where the backbone's parameters come from, resolved from the configuration.
#[derive(Debug, Clone)]
pub enum WeightSource {
    /// Load every parameter from this checkpoint file.
    Checkpoint(PathBuf),
    /// Initialize every layer with these settings.
    Layers(LayerInitConfig),
}

impl WeightSource {
    /// The layer initializers used while building the modules.
    ///
    /// A checkpoint overwrites every parameter afterwards, so the defaults apply.
    pub fn layer_init(&self) -> LayerInitConfig {
        match self {
            Self::Layers(layers) => layers.clone(),
            Self::Checkpoint(_) => LayerInitConfig::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn default_conv_init_is_fan_out_kaiming() {
        match LayerInitConfig::new().conv.initializer() {
            Initializer::KaimingNormal { gain, fan_out_only } => {
                assert!((gain - SQRT_2).abs() < f64::EPSILON);
                assert!(fan_out_only);
            }
            other => panic!("unexpected initializer {other:?}"),
        }
    }

    #[test]
    fn norm_affine_is_constant() {
        let device = Default::default();
        let (scale, shift) = LayerInitConfig::new()
            .with_norm_scale(0.5)
            .norm_affine::<TestBackend>(3, &device);

        assert_eq!(
            scale.val().into_data().to_vec::<f32>().unwrap(),
            vec![0.5; 3]
        );
        assert_eq!(
            shift.val().into_data().to_vec::<f32>().unwrap(),
            vec![0.0; 3]
        );
    }
}
