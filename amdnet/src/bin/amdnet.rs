//! Command-line tools for the AMDNet backbone.
//!
//! ```bash
//! # Build the backbone and print the shape of every output
//! cargo run --features cli --bin amdnet -- summary --height 256 --width 256
//!
//! # Convert an mmsegmentation checkpoint to a Burn record
//! cargo run --features cli,pretrained --bin amdnet -- convert model.pth model.mpk
//! ```

use std::path::{Path, PathBuf};

use amdnet_burn::AmdNetConfig;
#[cfg(feature = "pretrained")]
use amdnet_burn::InitConfig;
use anyhow::{Context, Result};
use burn::{backend::NdArray, prelude::*};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "amdnet")]
#[command(about = "AMDNet-EFFU: attention-gated encoder feature fusion backbone")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the backbone and run a zero input through it
    Summary {
        /// Backbone configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 1)]
        batch: usize,

        #[arg(long, default_value_t = 64)]
        height: usize,

        #[arg(long, default_value_t = 64)]
        width: usize,
    },

    /// Convert a PyTorch checkpoint to a named MessagePack record
    #[cfg(feature = "pretrained")]
    Convert {
        /// Input PyTorch checkpoint (.pth file)
        input: PathBuf,

        /// Output Burn record (.mpk file)
        output: PathBuf,

        /// Backbone configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AmdNetConfig> {
    let Some(path) = path else {
        return Ok(AmdNetConfig::new());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    AmdNetConfig::from_json(&json)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let device = Default::default();

    match cli.command {
        Commands::Summary {
            config,
            batch,
            height,
            width,
        } => {
            let config = load_config(config.as_deref())?;
            let model = config
                .init::<Backend>(&device)
                .context("Failed to initialize model")?
                .train(false);

            let input =
                Tensor::<Backend, 4>::zeros([batch, config.in_channels, height, width], &device);
            let outs = model.forward(input).context("Forward pass failed")?;

            println!("AMDNet backbone");
            println!("  Stages: {}", config.num_stages);
            println!(
                "  Whole downsample rate: {}",
                model.geometry().whole_downsample_rate
            );
            println!("  Parameters: {}", model.num_params());
            for (i, out) in outs.iter().enumerate() {
                println!("  Output {i}: {:?}", out.dims());
            }
            Ok(())
        }

        #[cfg(feature = "pretrained")]
        Commands::Convert {
            input,
            output,
            config,
        } => {
            if !input.exists() {
                anyhow::bail!("Input model file does not exist: {}", input.display());
            }

            let model = load_config(config.as_deref())?
                .with_pretrained(None)
                .with_init(Some(InitConfig::Pretrained(input)))
                .init::<Backend>(&device)
                .context("Failed to load PyTorch checkpoint")?;

            amdnet_burn::weights::save_checkpoint(model, &output)
                .context("Failed to save converted model")?;
            println!("Model conversion completed successfully!");
            Ok(())
        }
    }
}
