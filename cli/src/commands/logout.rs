//! `imgload logout` command - Remove a registry login from the Docker CLI config.

use clap::Args;
use imgload_runtime::DockerConfig;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server (default: index.docker.io)
    pub server: Option<String>,
}

pub async fn execute(args: LogoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let docker = DockerConfig::default_path()?;
    println!("{}", logout(&docker, args.server)?);
    Ok(())
}

fn logout(
    docker: &DockerConfig,
    server: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    let server = server.unwrap_or_else(|| super::login::DEFAULT_SERVER.to_string());
    if docker.remove(&server)? {
        Ok(format!("Removing login credentials for {}", server))
    } else {
        Ok(format!("Not logged in to {}", server))
    }
}
