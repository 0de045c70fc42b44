//! imgload Core - shared error and configuration types.

pub mod config;
pub mod error;

pub use config::{DaemonConfig, LoaderConfig, RegistryConfig};
pub use error::{ErrorKind, LoadError, Result};

/// imgload version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
