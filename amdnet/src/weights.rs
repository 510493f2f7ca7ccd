//! # Checkpoint Loading
//!
//! Loads backbone parameters from a file, picking the reader from the extension:
//!
//! - `.mpk`: Burn's named MessagePack records
//! - `.bin`: Burn's binary records
//! - `.pth` / `.pt`: PyTorch state dicts from the mmsegmentation training code
//!   (requires the `pretrained` feature)

use std::path::Path;

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};

use crate::{
    error::{AmdNetError, AmdNetResult},
    models::AmdNet,
};

/// Regex remaps from the mmsegmentation parameter names to this crate's module
/// tree, applied in order.
///
/// The reference layout wraps every encoder stage and fusion projection in a
/// one-element `Sequential` and names its norms `bn`/`gn`.
pub const PYTORCH_KEY_REMAP: [(&str, &str); 7] = [
    (r"^backbone\.(.+)", "$1"),
    (r"^effu_c2\.(\d+)\.0\.(.+)", "encoder.$1.$2"),
    (r"^effu_c1\.(\d+)\.0\.(.+)", "fusion.$1.project.$2"),
    (
        r"^effu_cbam\.(\d+)\.ca\.se\.0\.(.+)",
        "fusion.$1.attention.channel.squeeze.$2",
    ),
    (
        r"^effu_cbam\.(\d+)\.ca\.se\.2\.(.+)",
        "fusion.$1.attention.channel.excite.$2",
    ),
    (r"^effu_cbam\.(\d+)\.sa\.(.+)", "fusion.$1.attention.spatial.$2"),
    (r"(.+)\.(?:bn|gn)\.(.+)", "$1.norm.$2"),
];

/// Loads every parameter of `model` from the checkpoint at `path`.
///
/// # Errors
///
/// Returns `AmdNetError::UnsupportedWeightFormat` for an unknown extension and
/// `AmdNetError::WeightLoadingFailed` if the file is missing or unreadable.
pub fn load_checkpoint<B: Backend>(
    model: AmdNet<B>,
    path: &Path,
    device: &B::Device,
) -> AmdNetResult<AmdNet<B>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if !matches!(extension.as_str(), "mpk" | "bin" | "pth" | "pt") {
        return Err(AmdNetError::UnsupportedWeightFormat {
            format: if extension.is_empty() {
                format!("no extension ({})", path.display())
            } else {
                extension
            },
        });
    }
    if !path.exists() {
        return Err(AmdNetError::WeightLoadingFailed {
            reason: format!("Weight file not found: {}", path.display()),
        });
    }

    tracing::info!(path = %path.display(), format = %extension, "loading AMDNet checkpoint");

    match extension.as_str() {
        "mpk" => model
            .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| AmdNetError::WeightLoadingFailed {
                reason: format!("MessagePack model loading failed: {e}"),
            }),
        "bin" => model
            .load_file(path, &BinFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| AmdNetError::WeightLoadingFailed {
                reason: format!("Binary model loading failed: {e}"),
            }),
        _ => load_pytorch(model, path, device),
    }
}

#[cfg(feature = "pretrained")]
fn load_pytorch<B: Backend>(
    model: AmdNet<B>,
    path: &Path,
    device: &B::Device,
) -> AmdNetResult<AmdNet<B>> {
    use burn::record::Recorder;
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    let load_args = PYTORCH_KEY_REMAP.iter().fold(
        LoadArgs::new(path.to_path_buf()).with_top_level_key("state_dict"),
        |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
    );

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .map_err(|e| AmdNetError::WeightLoadingFailed {
            reason: format!("PyTorch model loading failed: {e}"),
        })?;
    Ok(model.load_record(record))
}

#[cfg(not(feature = "pretrained"))]
fn load_pytorch<B: Backend>(
    _model: AmdNet<B>,
    path: &Path,
    _device: &B::Device,
) -> AmdNetResult<AmdNet<B>> {
    Err(AmdNetError::UnsupportedWeightFormat {
        format: format!(
            "{} (PyTorch checkpoints need the `pretrained` feature)",
            path.display()
        ),
    })
}

/// Saves `model` as a named MessagePack record at `path`.
///
/// # Errors
///
/// Returns `AmdNetError::WeightLoadingFailed` if the file cannot be written.
pub fn save_checkpoint<B: Backend>(model: AmdNet<B>, path: &Path) -> AmdNetResult<()> {
    tracing::info!(path = %path.display(), "saving AMDNet checkpoint");
    model
        .save_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| AmdNetError::WeightLoadingFailed {
            reason: format!("failed to save {}: {e}", path.display()),
        })
}
