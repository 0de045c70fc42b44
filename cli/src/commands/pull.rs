//! `imgload pull` command.

use clap::Args;
use imgload_core::LoaderConfig;
use imgload_runtime::{ImageReference, ImageWriter, LoadOutput};

use crate::output::login_hint;

#[derive(Args)]
pub struct PullArgs {
    /// Image reference (e.g., "alpine:latest", "ghcr.io/org/image:tag")
    pub image: String,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Set target platform (e.g., "linux/amd64", "linux/arm64")
    #[arg(long)]
    pub platform: Option<String>,
}

pub async fn execute(
    args: PullArgs,
    mut config: LoaderConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.platform.is_some() {
        config.registry.platform = args.platform.clone();
    }
    let writer = ImageWriter::from_config(&config)?;

    if !args.quiet {
        println!("Pulling {}...", args.image);
    }
    let response = match writer.write_image_to_daemon(&args.image).await {
        Ok(response) => response,
        Err(e) => {
            if e.needs_login() {
                if let Ok(reference) = ImageReference::parse(&args.image) {
                    eprintln!("{}", login_hint(&reference.registry));
                }
            } else if let Some(partial) = e.partial_response().filter(|p| !p.is_empty()) {
                eprintln!("{}", partial.trim_end());
            }
            return Err(e.into());
        }
    };

    let loaded = loaded_images(&args.image, &response)?;
    if args.quiet {
        println!("{}", args.image);
    } else {
        for line in &loaded {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Lines the daemon reported for a finished load.
///
/// The daemon answers 200 before it has read the archive, so a rejected
/// image only shows up as an error message inside the body.
fn loaded_images(image: &str, response: &str) -> Result<Vec<String>, String> {
    let output = LoadOutput::parse(response);
    match output.error {
        Some(error) => Err(format!("daemon failed to load {}: {}", image, error)),
        None => Ok(output.loaded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_lines() {
        let response = concat!(
            "{\"stream\":\"Loaded image: alpine:3.19\\n\"}\n",
            "{\"stream\":\"\\n\"}\n",
        );
        assert_eq!(
            loaded_images("alpine:3.19", response).unwrap(),
            vec!["Loaded image: alpine:3.19".to_string()]
        );
    }

    #[test]
    fn test_in_stream_error_fails_pull() {
        let response = concat!(
            "{\"stream\":\"Loading layer\"}\n",
            "{\"errorDetail\":{\"message\":\"invalid tar header\"},\"error\":\"invalid tar header\"}\n",
        );
        assert_eq!(
            loaded_images("alpine:3.19", response).unwrap_err(),
            "daemon failed to load alpine:3.19: invalid tar header"
        );
    }

    #[test]
    fn test_error_without_detail() {
        let err = loaded_images("nginx", "{\"error\":\"no space left on device\"}").unwrap_err();
        assert!(err.ends_with("no space left on device"));
    }

    #[test]
    fn test_plain_text_response() {
        assert_eq!(
            loaded_images("nginx", "Loaded image ID: sha256:abc\n").unwrap(),
            vec!["Loaded image ID: sha256:abc".to_string()]
        );
        assert!(loaded_images("nginx", "").unwrap().is_empty());
    }
}
