use thiserror::Error;

/// The error type for `AMDNet-Burn` operations.
///
/// Every variant is raised synchronously, either while the backbone is being
/// constructed or at the start of a forward call, before any convolution runs.
#[derive(Error, Debug)]
pub enum AmdNetError {
    /// A per-stage configuration sequence does not match the stage count.
    #[error(
        "The length of {name} should be equal to {expected_label}, while the {name} is {values}, \
         the length of {name} is {actual}, and the num_stages is {num_stages}."
    )]
    SequenceLength {
        /// Name of the offending sequence.
        name: &'static str,
        /// How the expected length is derived, e.g. `num_stages` or `(num_stages-1)`.
        expected_label: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
        /// The sequence, formatted for display.
        values: String,
        /// The configured stage count.
        num_stages: usize,
    },

    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// The legacy `pretrained` path and the structured `init` were both given.
    #[error("init and pretrained cannot be set at the same time")]
    ConflictingInitialization,

    /// The legacy `pretrained` value was neither a string nor null.
    #[error("pretrained must be a str or None, got {found}")]
    InvalidPretrainedType {
        /// The JSON type that was found.
        found: &'static str,
    },

    /// A feature that the backbone accepts in its configuration but does not implement.
    #[error("{feature} is not implemented yet")]
    Unimplemented {
        /// The requested feature.
        feature: &'static str,
    },

    /// The input spatial size is not divisible by the encoder's whole downsample rate.
    #[error(
        "The input image size ({height}, {width}) should be divisible by the whole downsample \
         rate {rate}, when num_stages is {num_stages}, strides is {strides}, and downsamples is \
         {downsamples}."
    )]
    IndivisibleInput {
        /// Input height.
        height: usize,
        /// Input width.
        width: usize,
        /// The whole downsample rate both sizes must be divisible by.
        rate: usize,
        /// The configured stage count.
        num_stages: usize,
        /// The configured strides, formatted for display.
        strides: String,
        /// The configured downsample flags, formatted for display.
        downsamples: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when loading model weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// The checkpoint file extension is not one this crate can read.
    #[error("unsupported weight file format: {format}")]
    UnsupportedWeightFormat {
        /// The rejected extension or description.
        format: String,
    },
}

/// A specialized `Result` type for `AMDNet-Burn` operations.
pub type AmdNetResult<T> = Result<T, AmdNetError>;
