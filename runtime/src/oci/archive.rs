//! `docker save` archive writer.
//!
//! Streams a remote image into the tarball format `docker load` accepts:
//!
//! ```text
//! <config-hex>.json        image config
//! <layer-hex>.tar.gz       one entry per layer, manifest order
//! manifest.json            [{"Config", "RepoTags", "Layers"}]
//! ```
//!
//! Entries are written header-first with the size taken from the layer
//! descriptor, so layers go straight from the registry into the output
//! without being held in memory.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use imgload_core::error::{LoadError, Result};
use oci_distribution::manifest::OciDescriptor;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::reference::ImageReference;
use super::registry::RemoteImage;

const BLOCK_SIZE: usize = 512;

/// One image entry of `manifest.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveManifest {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

/// Write `image` to `out` as a `docker save` archive.
///
/// Every blob is checked against its descriptor's size and digest.
pub async fn write_archive<W>(
    reference: &ImageReference,
    image: &dyn RemoteImage,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let manifest = image.manifest();

    let config_name = format!("{}.json", digest_hex(&manifest.config.digest)?);
    write_blob_entry(image, &manifest.config, &config_name, out).await?;

    let mut layers = Vec::with_capacity(manifest.layers.len());
    for (index, layer) in manifest.layers.iter().enumerate() {
        let name = layer_file_name(layer)?;
        tracing::debug!(
            reference = %reference,
            index,
            digest = %layer.digest,
            size = layer.size,
            "Streaming layer"
        );
        write_blob_entry(image, layer, &name, out).await?;
        layers.push(name);
    }

    let entry = ArchiveManifest {
        config: config_name,
        repo_tags: reference.repo_tag().into_iter().collect(),
        layers,
    };
    let manifest_json = serde_json::to_vec(&[entry])?;
    write_entry_header(out, "manifest.json", manifest_json.len() as u64).await?;
    out.write_all(&manifest_json).await?;
    write_padding(out, manifest_json.len() as u64).await?;

    // End of archive: two zero blocks.
    out.write_all(&[0u8; BLOCK_SIZE * 2]).await?;
    out.flush().await?;
    Ok(())
}

/// File name for a layer blob inside the archive.
fn layer_file_name(layer: &OciDescriptor) -> Result<String> {
    let hex = digest_hex(&layer.digest)?;
    if layer.media_type.ends_with("gzip") {
        Ok(format!("{}.tar.gz", hex))
    } else {
        Ok(format!("{}.tar", hex))
    }
}

fn digest_hex(digest: &str) -> Result<&str> {
    match digest.split_once(':') {
        Some(("sha256", hex)) if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Ok(hex)
        }
        _ => Err(LoadError::Serialization(format!(
            "Unsupported digest '{}': expected sha256:<64 hex>",
            digest
        ))),
    }
}

fn descriptor_size(descriptor: &OciDescriptor) -> Result<u64> {
    u64::try_from(descriptor.size).map_err(|_| {
        LoadError::Serialization(format!(
            "Invalid size {} for blob {}",
            descriptor.size, descriptor.digest
        ))
    })
}

async fn write_blob_entry<W>(
    image: &dyn RemoteImage,
    descriptor: &OciDescriptor,
    name: &str,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let size = descriptor_size(descriptor)?;
    write_entry_header(out, name, size).await?;

    let mut verifier = VerifyingWriter::new(out);
    image.write_blob(descriptor, &mut verifier).await?;
    let (written, digest) = verifier.finish();

    if written != size {
        return Err(LoadError::Serialization(format!(
            "Blob {} size mismatch: descriptor says {} bytes, registry sent {}",
            descriptor.digest, size, written
        )));
    }
    let expected = digest_hex(&descriptor.digest)?;
    if digest != expected {
        return Err(LoadError::Serialization(format!(
            "Blob {} digest mismatch: got sha256:{}",
            descriptor.digest, digest
        )));
    }

    write_padding(out, size).await
}

async fn write_entry_header<W>(out: &mut W, name: &str, size: u64) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut header = tar::Header::new_gnu();
    header.set_path(name).map_err(|e| {
        LoadError::Serialization(format!("Invalid archive entry name '{}': {}", name, e))
    })?;
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    out.write_all(header.as_bytes()).await?;
    Ok(())
}

async fn write_padding<W>(out: &mut W, size: u64) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let remainder = (size % BLOCK_SIZE as u64) as usize;
    if remainder != 0 {
        out.write_all(&[0u8; BLOCK_SIZE][..BLOCK_SIZE - remainder]).await?;
    }
    Ok(())
}

/// Pass-through writer that counts and hashes what goes through it.
struct VerifyingWriter<'a, W> {
    inner: &'a mut W,
    hasher: Sha256,
    written: u64,
}

impl<'a, W> VerifyingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Byte count and hex sha256 of everything written.
    fn finish(self) -> (u64, String) {
        (self.written, hex::encode(self.hasher.finalize()))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for VerifyingWriter<'_, W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut *this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.hasher.update(&buf[..n]);
                this.written += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_shutdown(cx)
    }
}
