//! Registry-to-daemon image writer.
//!
//! Parses a reference, fetches the image from its registry and hands it to
//! the load bridge.

use std::sync::Arc;
use std::time::Duration;

use imgload_core::config::{LoaderConfig, DEFAULT_PIPE_CAPACITY};
use imgload_core::error::{LoadError, Result};
use tokio::io::AsyncWrite;

use crate::daemon::{daemon_write, DockerDaemon, ImageLoader};
use crate::oci::{
    write_archive, FetchError, ImageReference, RegistryFetcher, RemoteFetcher, RemoteImage,
};

/// Registry message for GitHub packages that need a login.
const GITHUB_NEEDS_LOGIN: &str = "GitHub Docker Registry needs login";

/// Registry error code for a missing or rejected login.
const UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Turn a fetch failure into the error callers branch on.
///
/// The registry client does not type its authentication failures, so they
/// are recognized by message.
pub fn classify_fetch_error(err: FetchError) -> LoadError {
    let message = err.message();
    if message.contains(GITHUB_NEEDS_LOGIN) {
        LoadError::GithubNeedsLogin(message.to_string())
    } else if message.contains(UNAUTHORIZED) {
        LoadError::NeedsLogin(message.to_string())
    } else {
        LoadError::RemoteFetch(message.to_string())
    }
}

/// Parse `image` and fetch it. Nothing is fetched for a malformed reference.
async fn resolve(
    fetcher: &dyn RemoteFetcher,
    image: &str,
) -> Result<(ImageReference, Arc<dyn RemoteImage>)> {
    let reference = ImageReference::parse(image)?;

    tracing::debug!(reference = %reference, "Getting image");
    let remote = fetcher
        .fetch(&reference)
        .await
        .map_err(classify_fetch_error)?;
    Ok((reference, remote))
}

/// Write `image` as a `docker save` archive into `out`.
pub async fn save_image<W>(
    fetcher: &dyn RemoteFetcher,
    image: &str,
    out: &mut W,
) -> Result<ImageReference>
where
    W: AsyncWrite + Unpin + Send,
{
    let (reference, remote) = resolve(fetcher, image).await?;
    tracing::debug!(reference = %reference, digest = %remote.digest(), "Saving image");
    write_archive(&reference, remote.as_ref(), out).await?;
    Ok(reference)
}

/// Writes registry images into a local daemon.
pub struct ImageWriter {
    fetcher: Arc<dyn RemoteFetcher>,
    loader: Arc<dyn ImageLoader>,
    pipe_capacity: usize,
    timeout: Option<Duration>,
}

impl ImageWriter {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, loader: Arc<dyn ImageLoader>) -> Self {
        Self {
            fetcher,
            loader,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            timeout: None,
        }
    }

    /// Writer using the registry and daemon named by `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = RegistryFetcher::from_config(config)?;
        let daemon = DockerDaemon::connect(&config.daemon_host())?;
        tracing::debug!(endpoint = %daemon.endpoint(), "Using daemon");

        Ok(Self::new(Arc::new(fetcher), Arc::new(daemon))
            .with_pipe_capacity(config.pipe_capacity)
            .with_timeout(config.daemon_timeout()))
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    /// Bound the daemon load call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pull `image` from its registry and load it into the daemon.
    ///
    /// Returns the daemon's response text.
    pub async fn write_image_to_daemon(&self, image: &str) -> Result<String> {
        tracing::info!(image, "Writing image to local daemon");
        let (reference, remote) = resolve(self.fetcher.as_ref(), image).await?;

        tracing::debug!(reference = %reference, digest = %remote.digest(), "Writing image");
        let load = daemon_write(
            self.loader.as_ref(),
            &reference,
            remote,
            self.pipe_capacity,
        );
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, load).await {
                Ok(result) => result,
                Err(_) => Err(LoadError::Timeout(format!(
                    "loading {} did not finish within {}s",
                    reference,
                    limit.as_secs()
                ))),
            },
            None => load.await,
        };
        let response = result.map_err(|e| e.context("writing daemon image"))?;

        tracing::info!(reference = %reference, "Image loaded");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticImage;
    use async_trait::async_trait;
    use imgload_core::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneImage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteFetcher for OneImage {
        async fn fetch(
            &self,
            _reference: &ImageReference,
        ) -> std::result::Result<Arc<dyn RemoteImage>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StaticImage::new(b"{}", &[b"layer"])))
        }
    }

    #[test]
    fn test_github_login_message() {
        let err = classify_fetch_error(FetchError::new(
            "GET https://docker.pkg.github.com/v2/: GitHub Docker Registry needs login",
        ));
        assert_eq!(err.kind(), ErrorKind::GithubNeedsLogin);
        assert!(err.to_string().contains("GitHub Docker Registry needs login"));
    }

    #[test]
    fn test_github_wins_over_unauthorized() {
        let err = classify_fetch_error(FetchError::new(
            "UNAUTHORIZED: GitHub Docker Registry needs login",
        ));
        assert_eq!(err.kind(), ErrorKind::GithubNeedsLogin);
    }

    #[test]
    fn test_unauthorized() {
        let err = classify_fetch_error(FetchError::new(
            "UNAUTHORIZED: authentication required",
        ));
        assert_eq!(err.kind(), ErrorKind::NeedsLogin);
        assert_eq!(err.to_string(), "UNAUTHORIZED: authentication required");
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let err = classify_fetch_error(FetchError::new("401 unauthorized"));
        assert_eq!(err.kind(), ErrorKind::RemoteFetch);
    }

    #[test]
    fn test_other_failures_are_wrapped() {
        let err = classify_fetch_error(FetchError::new("manifest unknown"));
        assert_eq!(err.kind(), ErrorKind::RemoteFetch);
        assert!(!err.needs_login());
        assert_eq!(err.to_string(), "getting remote image: manifest unknown");
    }

    #[test]
    fn test_from_config_rejects_bad_host() {
        let mut config = LoaderConfig::default();
        config.daemon.host = Some("npipe:////./pipe/docker_engine".to_string());
        assert!(matches!(
            ImageWriter::from_config(&config),
            Err(LoadError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_save_image_writes_archive() {
        let fetcher = OneImage {
            calls: AtomicUsize::new(0),
        };
        let mut out = Vec::new();
        let reference = save_image(&fetcher, "redis:7", &mut out).await.unwrap();

        assert_eq!(reference.repo_tag().as_deref(), Some("redis:7"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let mut archive = tar::Archive::new(out.as_slice());
        assert_eq!(archive.entries().unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_save_image_bad_reference() {
        let fetcher = OneImage {
            calls: AtomicUsize::new(0),
        };
        let mut out = Vec::new();
        let err = save_image(&fetcher, "", &mut out).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReferenceParse);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(out.is_empty());
    }
}
