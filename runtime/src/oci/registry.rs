//! OCI registry access.
//!
//! Uses the `oci-distribution` crate to interact with container registries
//! (Docker Hub, GHCR, etc.). Fetching an image only pulls its manifest;
//! config and layer blobs are streamed later, while the archive is written.

use std::sync::Arc;

use async_trait::async_trait;
use imgload_core::config::LoaderConfig;
use imgload_core::error::{LoadError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use thiserror::Error;
use tokio::io::AsyncWrite;

use super::credentials::DockerConfig;
use super::reference::ImageReference;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`, or anonymous.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Resolve credentials for `registry`: the Docker CLI config (also
    /// written by `imgload login`), then env vars, then anonymous.
    pub fn for_registry(registry: &str) -> Self {
        match DockerConfig::default_path().and_then(|docker| {
            let found = docker.get(registry)?;
            Ok((docker, found))
        }) {
            Ok((docker, Some((username, password)))) => {
                tracing::debug!(registry, path = %docker.path().display(), "Using stored login");
                return Self::basic(username, password);
            }
            Ok((_, None)) => {}
            Err(e) => tracing::warn!(registry, error = %e, "Ignoring Docker CLI config"),
        }
        Self::from_env()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Failure reported by a [`RemoteFetcher`].
///
/// Only the upstream message is kept; callers classify it by its text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A registry image whose manifest is known and whose blobs can be streamed.
#[async_trait]
pub trait RemoteImage: Send + Sync {
    /// Image manifest (config + layer descriptors).
    fn manifest(&self) -> &OciImageManifest;

    /// Manifest digest.
    fn digest(&self) -> &str;

    /// Stream one blob named by `descriptor` into `out`.
    async fn write_blob(
        &self,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()>;
}

/// Resolves references to remote images.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(
        &self,
        reference: &ImageReference,
    ) -> std::result::Result<Arc<dyn RemoteImage>, FetchError>;
}

/// [`RemoteFetcher`] backed by an `oci-distribution` client.
pub struct RegistryFetcher {
    client: Arc<Client>,
    auth: Option<RegistryAuth>,
}

impl RegistryFetcher {
    /// Fetcher using HTTPS and the host's linux platform.
    pub fn new() -> Self {
        Self::build(ClientProtocol::Https, "linux".to_string(), host_arch())
    }

    /// Fetcher honoring the platform and insecure registries in `config`.
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        let (os, arch) = config.platform()?;
        let protocol = if config.registry.insecure.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(config.registry.insecure.clone())
        };
        Ok(Self::build(protocol, os, arch))
    }

    /// Use `auth` for every registry instead of per-registry lookup.
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    fn build(protocol: ClientProtocol, os: String, arch: String) -> Self {
        let config = ClientConfig {
            protocol,
            platform_resolver: Some(Box::new(move |manifests: &[ImageIndexEntry]| {
                select_platform(manifests, &os, &arch)
            })),
            ..Default::default()
        };
        Self {
            client: Arc::new(Client::new(config)),
            auth: None,
        }
    }

    fn auth_for(&self, registry: &str) -> RegistryAuth {
        self.auth
            .clone()
            .unwrap_or_else(|| RegistryAuth::for_registry(registry))
    }
}

impl Default for RegistryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFetcher for RegistryFetcher {
    async fn fetch(
        &self,
        reference: &ImageReference,
    ) -> std::result::Result<Arc<dyn RemoteImage>, FetchError> {
        let oci_ref = reference
            .to_oci()
            .map_err(|e| FetchError::new(e.to_string()))?;
        let auth = self.auth_for(&reference.registry);

        tracing::debug!(
            reference = %reference,
            anonymous = auth.is_anonymous(),
            "Pulling manifest"
        );

        let (manifest, digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth.to_oci_auth())
            .await
            .map_err(fetch_error_message)?;

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            "Manifest resolved"
        );

        Ok(Arc::new(RegistryImage {
            client: Arc::clone(&self.client),
            oci_ref,
            manifest,
            digest,
        }))
    }
}

/// Render an upstream error for classification.
///
/// A plain 401 is reported by the client without the registry's error
/// code, so it is spelled out here as the registry API would.
fn fetch_error_message(err: OciDistributionError) -> FetchError {
    match err {
        OciDistributionError::UnauthorizedError { url } => {
            FetchError::new(format!("UNAUTHORIZED: authentication required: {}", url))
        }
        other => FetchError::new(other.to_string()),
    }
}

/// Image handle returned by [`RegistryFetcher`].
struct RegistryImage {
    client: Arc<Client>,
    oci_ref: Reference,
    manifest: OciImageManifest,
    digest: String,
}

#[async_trait]
impl RemoteImage for RegistryImage {
    fn manifest(&self) -> &OciImageManifest {
        &self.manifest
    }

    fn digest(&self) -> &str {
        &self.digest
    }

    async fn write_blob(
        &self,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        self.client
            .pull_blob(&self.oci_ref, descriptor, out)
            .await
            .map_err(|e| {
                LoadError::Serialization(format!(
                    "Failed to pull blob {}: {}",
                    descriptor.digest, e
                ))
            })
    }
}

fn host_arch() -> String {
    imgload_core::config::host_arch().to_string()
}

/// Pick the index entry for `os`/`arch`.
fn select_platform(manifests: &[ImageIndexEntry], os: &str, arch: &str) -> Option<String> {
    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == os && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_distribution::manifest::Platform;

    fn entry(digest: &str, os: &str, arch: &str) -> ImageIndexEntry {
        ImageIndexEntry {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            digest: digest.to_string(),
            size: 100,
            platform: Some(Platform {
                architecture: arch.to_string(),
                os: os.to_string(),
                os_version: None,
                os_features: None,
                variant: None,
                features: None,
            }),
            annotations: None,
        }
    }

    #[test]
    fn test_registry_auth_anonymous() {
        let auth = RegistryAuth::anonymous();
        assert!(auth.is_anonymous());
        assert!(matches!(auth.to_oci_auth(), OciRegistryAuth::Anonymous));
    }

    #[test]
    fn test_registry_auth_basic() {
        let auth = RegistryAuth::basic("user", "pass");
        assert!(!auth.is_anonymous());
        assert!(matches!(auth.to_oci_auth(), OciRegistryAuth::Basic(u, p) if u == "user" && p == "pass"));
    }

    #[test]
    fn test_fixed_auth_overrides_lookup() {
        let fetcher = RegistryFetcher::new().with_auth(RegistryAuth::basic("a", "b"));
        assert_eq!(fetcher.auth_for("ghcr.io"), RegistryAuth::basic("a", "b"));
    }

    #[test]
    fn test_select_platform() {
        let manifests = vec![
            entry("sha256:amd", "linux", "amd64"),
            entry("sha256:arm", "linux", "arm64"),
            entry("sha256:win", "windows", "amd64"),
        ];
        assert_eq!(
            select_platform(&manifests, "linux", "arm64"),
            Some("sha256:arm".to_string())
        );
        assert_eq!(
            select_platform(&manifests, "windows", "amd64"),
            Some("sha256:win".to_string())
        );
        assert_eq!(select_platform(&manifests, "linux", "s390x"), None);
    }

    #[test]
    fn test_unauthorized_is_spelled_out() {
        let err = fetch_error_message(OciDistributionError::UnauthorizedError {
            url: "https://ghcr.io/v2/org/app/manifests/latest".to_string(),
        });
        assert!(err.message().contains("UNAUTHORIZED"));
        assert!(err.message().contains("ghcr.io"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = fetch_error_message(OciDistributionError::GenericError(Some(
            "connection refused".to_string(),
        )));
        assert!(err.message().contains("connection refused"));
        assert!(!err.message().contains("UNAUTHORIZED"));
    }

    #[test]
    fn test_from_config_rejects_bad_platform() {
        let mut config = LoaderConfig::default();
        config.registry.platform = Some("linux".to_string());
        assert!(RegistryFetcher::from_config(&config).is_err());
    }
}
