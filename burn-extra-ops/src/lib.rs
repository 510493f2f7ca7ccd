//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used by segmentation
//! backbones but are not yet available in the core Burn framework.

mod ceil_pool;
mod checkpoint;
mod hard_sigmoid;

// Convenient re-exports
pub use ceil_pool::{CeilMaxPool2d, CeilMaxPool2dConfig};
pub use checkpoint::checkpoint;
pub use hard_sigmoid::{hard_sigmoid, HardSigmoid, HardSigmoidConfig};
