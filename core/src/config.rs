//! Loader configuration.
//!
//! Read from `~/.imgload/config.yaml` when present. Every field has a
//! default, so an empty or missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LoadError, Result};

/// Default daemon endpoint when neither config nor `DOCKER_HOST` names one.
pub const DEFAULT_DAEMON_HOST: &str = "unix:///var/run/docker.sock";

/// Default pipe capacity, in chunks.
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Daemon connection settings
    pub daemon: DaemonConfig,

    /// Registry settings
    pub registry: RegistryConfig,

    /// Number of in-flight chunks between the archive writer and the daemon
    pub pipe_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            registry: RegistryConfig::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Daemon connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// `unix:///path/to.sock` or `tcp://host:port`
    pub host: Option<String>,

    /// Upper bound on a whole load call, in seconds
    pub timeout_secs: Option<u64>,
}

/// Registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Platform to select from multi-arch images, as `os/arch`
    pub platform: Option<String>,

    /// Registries reached over plain HTTP
    pub insecure: Vec<String>,
}

impl LoaderConfig {
    /// Default config file location (`~/.imgload/config.yaml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".imgload"))
            .unwrap_or_else(|| PathBuf::from(".imgload"))
            .join("config.yaml")
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            LoadError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: LoaderConfig = if data.trim().is_empty() {
            LoaderConfig::default()
        } else {
            serde_yaml::from_str(&data).map_err(|e| {
                LoadError::Config(format!("Failed to parse {}: {}", path.display(), e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Self::default_path();
        if default.exists() {
            tracing::debug!(path = %default.display(), "Loading config");
            Self::load(&default)
        } else {
            Ok(Self::default())
        }
    }

    /// Check field values.
    pub fn validate(&self) -> Result<()> {
        if self.pipe_capacity == 0 {
            return Err(LoadError::Config(
                "pipe_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(ref host) = self.daemon.host {
            if !host.starts_with("unix://") && !host.starts_with("tcp://") {
                return Err(LoadError::Config(format!(
                    "Unsupported daemon host '{}': expected unix:// or tcp://",
                    host
                )));
            }
        }
        if let Some(ref platform) = self.registry.platform {
            parse_platform(platform)?;
        }
        if self.daemon.timeout_secs == Some(0) {
            return Err(LoadError::Config(
                "daemon.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Daemon endpoint: config, then `DOCKER_HOST`, then the default socket.
    pub fn daemon_host(&self) -> String {
        self.daemon
            .host
            .clone()
            .or_else(|| std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| DEFAULT_DAEMON_HOST.to_string())
    }

    /// Load call timeout, if configured.
    pub fn daemon_timeout(&self) -> Option<Duration> {
        self.daemon.timeout_secs.map(Duration::from_secs)
    }

    /// Target `(os, arch)` for multi-arch images.
    pub fn platform(&self) -> Result<(String, String)> {
        match self.registry.platform {
            Some(ref p) => parse_platform(p),
            None => Ok(("linux".to_string(), host_arch().to_string())),
        }
    }

    /// Whether `registry` is reached over plain HTTP.
    pub fn is_insecure(&self, registry: &str) -> bool {
        self.registry.insecure.iter().any(|r| r == registry)
    }
}

/// Host CPU architecture in OCI naming.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

fn parse_platform(platform: &str) -> Result<(String, String)> {
    match platform.split_once('/') {
        Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
            Ok((os.to_string(), arch.to_string()))
        }
        _ => Err(LoadError::Config(format!(
            "Invalid platform '{}': expected os/arch",
            platform
        ))),
    }
}
