//! OCI image reference parsing.
//!
//! Grammar and Docker Hub normalization are delegated to
//! `oci_distribution::Reference`; this type exposes the parts the loader
//! needs and adds the `RepoTags` naming used in `docker save` archives.

use imgload_core::error::{LoadError, Result};
use oci_distribution::Reference;

/// Registry hostname Docker Hub references resolve to.
const DOCKER_HUB: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `myuser/myimage:v1` → docker.io/myuser/myimage:v1
    /// - `ghcr.io/org/image@sha256:...` → no tag, digest only
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(LoadError::ReferenceParse(
                "empty image reference".to_string(),
            ));
        }

        let parsed: Reference = reference.parse().map_err(|e| {
            LoadError::ReferenceParse(format!("'{}': {}", reference, e))
        })?;

        let digest = parsed.digest().map(str::to_string);
        let tag = match parsed.tag() {
            Some(tag) => Some(tag.to_string()),
            None if digest.is_none() => Some(DEFAULT_TAG.to_string()),
            None => None,
        };

        Ok(ImageReference {
            registry: parsed.registry().to_string(),
            repository: parsed.repository().to_string(),
            tag,
            digest,
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }

    /// Name the daemon should tag the loaded image with.
    ///
    /// Docker Hub images drop the registry (and `library/` for official
    /// images), matching what `docker images` shows. Digest-only references
    /// have no tag to apply.
    pub fn repo_tag(&self) -> Option<String> {
        let tag = self.tag.as_ref()?;
        let name = if self.registry == DOCKER_HUB {
            self.repository
                .strip_prefix("library/")
                .unwrap_or(&self.repository)
                .to_string()
        } else {
            format!("{}/{}", self.registry, self.repository)
        };
        Some(format!("{}:{}", name, tag))
    }

    /// Convert to the registry client's reference type.
    pub(crate) fn to_oci(&self) -> Result<Reference> {
        let full = self.full_reference();
        full.parse::<Reference>().map_err(|e| {
            LoadError::ReferenceParse(format!("'{}': {}", full, e))
        })
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgload_core::ErrorKind;

    const DIGEST: &str =
        "sha256:abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890";

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, Some("latest".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_user_repo_with_tag() {
        let r = ImageReference::parse("myuser/myimage:v1.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "myuser/myimage");
        assert_eq!(r.tag, Some("v1.0".to_string()));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("myregistry.io:5000/team/app:v1").unwrap();
        assert_eq!(r.registry, "myregistry.io:5000");
        assert_eq!(r.repository, "team/app");
        assert_eq!(r.tag, Some("v1".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse(&format!("ghcr.io/org/app@{}", DIGEST)).unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "org/app");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.as_deref(), Some(DIGEST));
    }

    #[test]
    fn test_surrounding_whitespace_rejected() {
        for bad in ["  nginx:1.25  ", "nginx:1.25\n", " alpine"] {
            let err = ImageReference::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ReferenceParse, "input {:?}", bad);
        }
    }

    #[test]
    fn test_parse_failures_are_reference_errors() {
        for bad in ["", "   ", "Nginx:Latest", "nginx@invaliddigest", "a//b", "nginx:"] {
            let err = ImageReference::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ReferenceParse, "input {:?}", bad);
            assert!(err.to_string().starts_with("parsing reference"));
        }
    }

    #[test]
    fn test_repo_tag_docker_hub_official() {
        let r = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(r.repo_tag(), Some("nginx:1.25".to_string()));
    }

    #[test]
    fn test_repo_tag_docker_hub_user() {
        let r = ImageReference::parse("myuser/app").unwrap();
        assert_eq!(r.repo_tag(), Some("myuser/app:latest".to_string()));
    }

    #[test]
    fn test_repo_tag_other_registry() {
        let r = ImageReference::parse("gcr.io/k8s-minikube/kicbase:v0.0.44").unwrap();
        assert_eq!(
            r.repo_tag(),
            Some("gcr.io/k8s-minikube/kicbase:v0.0.44".to_string())
        );
    }

    #[test]
    fn test_repo_tag_digest_only() {
        let r = ImageReference::parse(&format!("ghcr.io/org/app@{}", DIGEST)).unwrap();
        assert_eq!(r.repo_tag(), None);
    }

    #[test]
    fn test_display_and_to_oci() {
        let r = ImageReference::parse("nginx:1.25").unwrap();
        assert_eq!(format!("{}", r), "docker.io/library/nginx:1.25");
        let oci = r.to_oci().unwrap();
        assert_eq!(oci.repository(), "library/nginx");
        assert_eq!(oci.tag(), Some("1.25"));
    }
}
