//! Image reference parsing.
//!
//! References such as `ghcr.io/buildpacks/assets:v1` are split into
//! registry, repository, tag and digest before any network access.

use std::fmt;
use std::str::FromStr;

use cnb_assets_core::error::{AssetError, Result};
use oci_distribution::Reference;

use crate::archive::sha256_bytes;

const DEFAULT_REGISTRY: &str = "docker.io";
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, with port if any.
    pub registry: String,
    /// Repository path, `library/` prefixed for single-name Docker Hub images.
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse `reference`. A tag of `latest` is assumed when neither tag nor
    /// digest is given.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AssetError::OciImageError(
                "empty image reference".to_string(),
            ));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid(reference, "contains whitespace"));
        }

        let (remainder, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') || digest.ends_with(':') {
                    return Err(invalid(reference, "digest must be algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag can only appear in the final path segment.
        let last_segment_start = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match remainder[last_segment_start..].rfind(':') {
            Some(colon) => {
                let split = last_segment_start + colon;
                let tag = &remainder[split + 1..];
                if tag.is_empty() {
                    return Err(invalid(reference, "empty tag"));
                }
                (&remainder[..split], Some(tag.to_string()))
            }
            None => (remainder, None),
        };

        let (registry, repository) = split_registry(name);
        validate_repository(reference, &repository)?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Fully qualified `registry/repository[:tag][@digest]`.
    pub fn full_reference(&self) -> String {
        let mut out = format!("{}/{}", self.registry, self.repository);
        if let Some(tag) = &self.tag {
            out.push(':');
            out.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            out.push('@');
            out.push_str(digest);
        }
        out
    }

    /// Directory name used by the local image store: the hex SHA-256 of
    /// the full reference, so distinct references never share a directory.
    pub fn store_key(&self) -> String {
        sha256_bytes(self.full_reference().as_bytes())
    }

    /// Convert to the registry client's reference type. Digests take
    /// precedence over tags.
    pub fn to_oci_reference(&self) -> Result<Reference> {
        let qualified = match (&self.digest, &self.tag) {
            (Some(digest), _) => format!("{}/{}@{}", self.registry, self.repository, digest),
            (None, Some(tag)) => format!("{}/{}:{}", self.registry, self.repository, tag),
            (None, None) => format!("{}/{}:{}", self.registry, self.repository, DEFAULT_TAG),
        };

        qualified.parse::<Reference>().map_err(|e| {
            AssetError::OciImageError(format!("invalid image reference {:?}: {}", qualified, e))
        })
    }
}

impl FromStr for ImageReference {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_reference())
    }
}

fn invalid(reference: &str, reason: &str) -> AssetError {
    AssetError::OciImageError(format!("invalid image reference {:?}: {}", reference, reason))
}

/// The first component names a registry when it looks like a host.
fn split_registry(name: &str) -> (String, String) {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            return (first.to_string(), rest.to_string());
        }
        return (DEFAULT_REGISTRY.to_string(), name.to_string());
    }
    (DEFAULT_REGISTRY.to_string(), format!("library/{}", name))
}

fn validate_repository(reference: &str, repository: &str) -> Result<()> {
    for component in repository.split('/') {
        if component.is_empty() {
            return Err(invalid(reference, "empty repository component"));
        }
        let valid = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(invalid(
                reference,
                "repository must be lowercase alphanumerics separated by '.', '_' or '-'",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_name() {
        let r = ImageReference::parse("assets").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/assets");
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert!(r.digest.is_none());
    }

    #[test]
    fn test_parse_custom_registry_with_port() {
        let r = ImageReference::parse("localhost:5000/buildpacks/assets:v2").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "buildpacks/assets");
        assert_eq!(r.tag.as_deref(), Some("v2"));
    }

    #[test]
    fn test_parse_digest_without_tag() {
        let r = ImageReference::parse("ghcr.io/org/assets@sha256:abc123").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.as_deref(), Some("sha256:abc123"));
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("ghcr.io/org/assets:v1@sha256:abc123").unwrap();
        assert_eq!(r.tag.as_deref(), Some("v1"));
        assert_eq!(r.digest.as_deref(), Some("sha256:abc123"));
        assert_eq!(r.full_reference(), "ghcr.io/org/assets:v1@sha256:abc123");
    }

    #[test]
    fn test_parse_user_repository() {
        let r = ImageReference::parse("cnbs/sample-assets:bionic").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "cnbs/sample-assets");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for bad in ["", "   ", "Upper/Case", "repo@nodigest", "repo:", "a//b", "two words"] {
            assert!(ImageReference::parse(bad).is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn test_store_key_is_directory_safe() {
        let r = ImageReference::parse("localhost:5000/org/assets:v1").unwrap();
        let key = r.store_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, ImageReference::parse("localhost:5000/org/assets:v1").unwrap().store_key());
    }

    #[test]
    fn test_store_keys_do_not_collide_on_separators() {
        let a = ImageReference::parse("org/a:b_c").unwrap();
        let b = ImageReference::parse("org/a_b:c").unwrap();
        assert_ne!(a.store_key(), b.store_key());
    }

    #[test]
    fn test_to_oci_reference() {
        let r = ImageReference::parse("ghcr.io/org/assets:v1").unwrap();
        assert_eq!(r.to_oci_reference().unwrap().to_string(), "ghcr.io/org/assets:v1");
    }

    #[test]
    fn test_display_and_from_str() {
        let r: ImageReference = "org/assets:1.0".parse().unwrap();
        assert_eq!(r.to_string(), "docker.io/org/assets:1.0");
    }
}
