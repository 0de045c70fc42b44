//! `imgload version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("imgload version {}", imgload_core::VERSION);
    println!("  runtime: {}", imgload_runtime::VERSION);
    Ok(())
}
