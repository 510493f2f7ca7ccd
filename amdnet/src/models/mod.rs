//! AMDNet model and its building blocks.

mod amdnet;
pub mod modules;

pub use amdnet::{AmdNet, AmdNetRecord, StageGeometry};
pub use modules::{CbamConfig, SeLayerConfig};
