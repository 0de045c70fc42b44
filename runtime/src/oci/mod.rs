//! OCI registry support.
//!
//! - Reference parsing
//! - Registry credentials
//! - Manifest fetch and blob streaming
//! - `docker save` archive serialization

mod archive;
pub mod credentials;
pub mod reference;
pub mod registry;

pub use archive::write_archive;
pub use credentials::DockerConfig;
pub use reference::ImageReference;
pub use registry::{FetchError, RegistryAuth, RegistryFetcher, RemoteFetcher, RemoteImage};
