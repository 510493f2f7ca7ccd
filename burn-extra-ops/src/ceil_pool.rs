//! # Ceil-Mode Max Pooling
//!
//! Burn's `MaxPool2d` floors the output size, dropping a trailing partial window.
//! `CeilMaxPool2d` keeps it: the input is padded with `-inf` on the bottom/right
//! edge up to the next multiple of the stride, so the padded cells can never win
//! the max against real values.

use burn::{
    nn::pool::{MaxPool2d, MaxPool2dConfig},
    prelude::*,
    tensor::ElementConversion,
};

/// Configuration for the `CeilMaxPool2d` module.
#[derive(Config, Debug)]
pub struct CeilMaxPool2dConfig {
    /// Square window size. The stride equals the window size.
    pub kernel_size: usize,
}

impl CeilMaxPool2dConfig {
    /// Initializes a new `CeilMaxPool2d` module.
    pub fn init(&self) -> CeilMaxPool2d {
        let pool = MaxPool2dConfig::new([self.kernel_size, self.kernel_size])
            .with_strides([self.kernel_size, self.kernel_size])
            .init();

        CeilMaxPool2d {
            pool,
            kernel_size: self.kernel_size,
        }
    }
}

/// Non-overlapping max pooling whose output size is `ceil(input / kernel_size)`.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, ceil(height / k), ceil(width / k)]`
#[derive(Module, Clone, Debug)]
pub struct CeilMaxPool2d {
    pool: MaxPool2d,
    kernel_size: usize,
}

impl CeilMaxPool2d {
    /// The window size (and stride) of this pool.
    pub const fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let pad_h = ceil_padding(height, self.kernel_size);
        let pad_w = ceil_padding(width, self.kernel_size);

        let x = if pad_h > 0 || pad_w > 0 {
            x.pad(
                (0, pad_w, 0, pad_h),
                B::FloatElem::from_elem(f32::NEG_INFINITY),
            )
        } else {
            x
        };

        self.pool.forward(x)
    }
}

/// Cells to append so that `len` becomes a multiple of `kernel_size`.
const fn ceil_padding(len: usize, kernel_size: usize) -> usize {
    (kernel_size - len % kernel_size) % kernel_size
}
