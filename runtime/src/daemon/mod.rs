//! Local daemon side: the load API client and the streaming bridge that
//! feeds it.

mod bridge;
mod client;
mod pipe;

pub use bridge::daemon_write;
pub use client::{DaemonEndpoint, DockerDaemon, ImageLoader, LoadOutput, LoadResponse};
pub use pipe::{pipe, PipeReader, PipeWriter};
