//! `imgload login` command - Save a registry login to the Docker CLI config.

use std::io::BufRead;

use clap::Args;
use imgload_runtime::DockerConfig;

/// Registry used when none is given.
pub(crate) const DEFAULT_SERVER: &str = "index.docker.io";

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (default: index.docker.io)
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn execute(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let docker = DockerConfig::default_path()?;
    let server = login(&docker, args, &mut input)?;
    tracing::debug!(server = %server, path = %docker.path().display(), "Stored credentials");

    println!("Login Succeeded");
    Ok(())
}

fn login(
    docker: &DockerConfig,
    args: LoginArgs,
    input: &mut dyn BufRead,
) -> Result<String, Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let username = match args.username {
        Some(u) => u,
        None => {
            eprint!("Username: ");
            read_line(input)?
        }
    };

    let password = if args.password_stdin {
        read_line(input)?
    } else {
        match args.password {
            Some(p) => p,
            None => {
                eprint!("Password: ");
                read_line(input)?
            }
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    docker.store(&server, &username, &password)?;
    Ok(server)
}

fn read_line(input: &mut dyn BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
