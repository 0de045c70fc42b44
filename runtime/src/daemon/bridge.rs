//! Pull-to-load bridge.
//!
//! One spawned task writes the image archive into a pipe while the calling
//! task streams the other end into the daemon's load endpoint and reads the
//! reply. Whichever side fails first is what the caller sees.

use std::sync::Arc;

use imgload_core::error::{LoadError, Result};

use super::client::{read_response, ImageLoader};
use super::pipe::pipe;
use crate::oci::{write_archive, ImageReference, RemoteImage};

/// Load `image` into the daemon behind `loader`, returning the daemon's
/// response text.
///
/// On a body read failure the text read so far is kept in
/// [`LoadError::ResponseRead`].
pub async fn daemon_write(
    loader: &dyn ImageLoader,
    reference: &ImageReference,
    image: Arc<dyn RemoteImage>,
    pipe_capacity: usize,
) -> Result<String> {
    let (mut writer, reader) = pipe(pipe_capacity);

    let task_reference = reference.clone();
    tokio::spawn(async move {
        let result = write_archive(&task_reference, image.as_ref(), &mut writer).await;
        if let Err(ref e) = result {
            tracing::warn!(reference = %task_reference, error = %e, "Archive stream failed");
        }
        writer.close_with_error(result).await;
    });

    let mut response = loader.load(reader).await.map_err(|e| match e {
        LoadError::LoadTransport(_) => e,
        other => LoadError::LoadTransport(other.to_string()),
    })?;

    // `response` is dropped on every path below.
    match read_response(&mut response).await {
        Ok(text) => Ok(text),
        Err((partial, e)) => Err(LoadError::ResponseRead {
            partial,
            message: e.to_string(),
        }),
    }
}
