//! CLI command definitions and dispatch.

mod login;
mod logout;
mod pull;
mod save;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use imgload_core::LoaderConfig;

/// imgload - pull registry images straight into a local container daemon.
#[derive(Parser)]
#[command(name = "imgload", version, about)]
pub struct Cli {
    /// Config file (default: ~/.imgload/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Daemon address, e.g. "unix:///var/run/docker.sock" or "tcp://127.0.0.1:2375"
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Pull an image from a registry into the local daemon
    Pull(pull::PullArgs),
    /// Write an image from a registry to a tar archive
    Save(save::SaveArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Load the config file and apply command-line overrides.
pub(crate) fn load_config(
    path: Option<&std::path::Path>,
    host: Option<String>,
) -> Result<LoaderConfig, Box<dyn std::error::Error>> {
    let mut config = LoaderConfig::load_or_default(path)?;
    if host.is_some() {
        config.daemon.host = host;
    }
    config.validate()?;
    Ok(config)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Pull(args) => {
            let config = load_config(cli.config.as_deref(), cli.host)?;
            pull::execute(args, config).await
        }
        Command::Save(args) => {
            let config = load_config(cli.config.as_deref(), cli.host)?;
            save::execute(args, config).await
        }
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
