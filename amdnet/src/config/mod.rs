//! Configuration module for AMDNet.
//!
//! - `core`: the backbone configuration and its derived stage geometry
//! - `enums`: layer choices (normalization, activation, attention, upsampling)

mod core;
mod enums;

pub use self::core::{AmdNetConfig, MAX_NUM_STAGES};

pub use self::enums::{
    ActivationConfig, DcnConfig, FusionAttention, NormConfig, PluginConfig, UpsampleMode,
};
