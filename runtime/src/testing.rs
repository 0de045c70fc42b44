//! In-memory remote images for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use imgload_core::error::{LoadError, Result};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::oci::RemoteImage;

pub(crate) const GZIP_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Descriptor for `data` as a gzip layer.
pub(crate) fn descriptor(data: &[u8]) -> OciDescriptor {
    OciDescriptor {
        media_type: GZIP_LAYER.to_string(),
        digest: format!("sha256:{}", sha256_hex(data)),
        size: data.len() as i64,
        ..Default::default()
    }
}

/// Remote image served from memory.
pub(crate) struct StaticImage {
    manifest: OciImageManifest,
    blobs: HashMap<String, Vec<u8>>,
    fail_layer: Option<usize>,
}

impl StaticImage {
    pub(crate) fn new(config: &[u8], layers: &[&[u8]]) -> Self {
        let mut blobs = HashMap::new();
        let mut config_desc = descriptor(config);
        config_desc.media_type = "application/vnd.oci.image.config.v1+json".to_string();
        blobs.insert(config_desc.digest.clone(), config.to_vec());

        let layer_descs: Vec<OciDescriptor> = layers
            .iter()
            .map(|data| {
                let desc = descriptor(data);
                blobs.insert(desc.digest.clone(), data.to_vec());
                desc
            })
            .collect();

        Self {
            manifest: OciImageManifest {
                config: config_desc,
                layers: layer_descs,
                ..Default::default()
            },
            blobs,
            fail_layer: None,
        }
    }

    /// Serve only the first half of layer `index`.
    pub(crate) fn with_truncated_layer(mut self, index: usize) -> Self {
        let digest = self.manifest.layers[index].digest.clone();
        if let Some(data) = self.blobs.get_mut(&digest) {
            let half = data.len() / 2;
            data.truncate(half);
        }
        self
    }

    /// Serve layer `index` with its first byte flipped.
    pub(crate) fn with_corrupt_layer(mut self, index: usize) -> Self {
        let digest = self.manifest.layers[index].digest.clone();
        if let Some(data) = self.blobs.get_mut(&digest) {
            data[0] ^= 0xff;
        }
        self
    }

    /// Fail partway through layer `index`.
    pub(crate) fn with_failing_layer(mut self, index: usize) -> Self {
        self.fail_layer = Some(index);
        self
    }

    pub(crate) fn config_hex(&self) -> String {
        self.manifest.config.digest.trim_start_matches("sha256:").to_string()
    }

    pub(crate) fn layer_hexes(&self) -> Vec<String> {
        self.manifest
            .layers
            .iter()
            .map(|l| l.digest.trim_start_matches("sha256:").to_string())
            .collect()
    }
}

#[async_trait]
impl RemoteImage for StaticImage {
    fn manifest(&self) -> &OciImageManifest {
        &self.manifest
    }

    fn digest(&self) -> &str {
        "sha256:0000000000000000000000000000000000000000000000000000000000000000"
    }

    async fn write_blob(
        &self,
        descriptor: &OciDescriptor,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        let data = self
            .blobs
            .get(&descriptor.digest)
            .ok_or_else(|| LoadError::Serialization(format!("unknown blob {}", descriptor.digest)))?;

        let failing = self
            .fail_layer
            .map(|i| self.manifest.layers[i].digest == descriptor.digest)
            .unwrap_or(false);
        if failing {
            out.write_all(&data[..data.len() / 2]).await?;
            return Err(LoadError::Serialization(
                "registry connection reset".to_string(),
            ));
        }

        out.write_all(data).await?;
        Ok(())
    }
}
