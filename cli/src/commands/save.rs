//! `imgload save` command - write a registry image to a tar archive.

use std::path::PathBuf;

use clap::Args;
use imgload_core::LoaderConfig;
use imgload_runtime::{save_image, ImageReference, RegistryFetcher};
use tokio::io::AsyncWriteExt;

use crate::output::{format_bytes, login_hint};

#[derive(Args)]
pub struct SaveArgs {
    /// Image reference (e.g., "alpine:latest")
    pub image: String,

    /// Write to this file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Set target platform (e.g., "linux/amd64", "linux/arm64")
    #[arg(long)]
    pub platform: Option<String>,
}

pub async fn execute(
    args: SaveArgs,
    mut config: LoaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.platform.is_some() {
        config.registry.platform = args.platform.clone();
        config.validate()?;
    }
    let fetcher = RegistryFetcher::from_config(&config)?;

    let mut file = tokio::fs::File::create(&args.output).await?;
    let saved = save_image(&fetcher, &args.image, &mut file).await;
    let reference = match saved {
        Ok(reference) => reference,
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(&args.output).await;
            if e.needs_login() {
                if let Ok(reference) = ImageReference::parse(&args.image) {
                    eprintln!("{}", login_hint(&reference.registry));
                }
            }
            return Err(e.into());
        }
    };
    file.flush().await?;

    let size = tokio::fs::metadata(&args.output).await?.len();
    println!(
        "Saved {} to {} ({})",
        reference,
        args.output.display(),
        format_bytes(size)
    );
    Ok(())
}
