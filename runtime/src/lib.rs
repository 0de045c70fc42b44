//! imgload Runtime - pull images from registries into a local daemon.
//!
//! The fetched image is serialized as a `docker save` archive on one end of
//! an in-process pipe while the other end streams into the daemon's load
//! endpoint, so the archive is never held in memory.

#![allow(clippy::result_large_err)]

pub mod daemon;
pub mod oci;
mod writer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types
pub use daemon::{daemon_write, DaemonEndpoint, DockerDaemon, ImageLoader, LoadOutput, LoadResponse};
pub use oci::{DockerConfig, ImageReference, RegistryAuth, RegistryFetcher};
pub use oci::{FetchError, RemoteFetcher, RemoteImage};
pub use writer::{classify_fetch_error, save_image, ImageWriter};

/// imgload Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
