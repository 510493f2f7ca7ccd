//! # AMDNet-Burn
//!
//! This crate provides a Rust implementation of the AMDNet-EFFU segmentation
//! backbone, built using the Burn deep learning framework. Each encoder stage is
//! fed by an attention-gated fusion of all shallower stages, and a top-down
//! decoder returns one feature map per stage for a segmentation head.
//!
//! ## Modules
//!
//! - `config`: The backbone configuration and the layer choices it is made of.
//! - `error`: Defines the custom error types used throughout the crate.
//! - `init`: Weight sources and layer initializers.
//! - `models`: The backbone and its building blocks.
//! - `weights`: Checkpoint loading and saving.
//!
//! ## Key Components
//!
//! - `AmdNet`: The main model struct.
//! - `AmdNetConfig`: The configuration struct that drives the model's construction.
//! - `AmdNetError`: The enum for all possible errors.
//!
//! ```no_run
//! use amdnet_burn::AmdNetConfig;
//! use burn::{backend::NdArray, tensor::Tensor};
//!
//! let device = Default::default();
//! let model = AmdNetConfig::new().init::<NdArray>(&device)?;
//! let outs = model.forward(Tensor::zeros([1, 3, 64, 64], &device))?;
//! assert_eq!(outs.len(), 5);
//! # Ok::<(), amdnet_burn::AmdNetError>(())
//! ```

mod config;
mod error;
pub mod init;
pub mod models;
pub mod weights;

#[doc(inline)]
pub use config::{
    ActivationConfig, AmdNetConfig, DcnConfig, FusionAttention, NormConfig, PluginConfig,
    UpsampleMode, MAX_NUM_STAGES,
};
#[doc(inline)]
pub use error::{AmdNetError, AmdNetResult};
#[doc(inline)]
pub use init::{ConvInit, InitConfig, LayerInitConfig, WeightSource};
#[doc(inline)]
pub use models::{AmdNet, AmdNetRecord, CbamConfig, SeLayerConfig, StageGeometry};

#[cfg(test)]
mod tests;
