//! Registry client for pulling and publishing asset package images.
//!
//! Uses the `oci-distribution` crate to talk to container registries.

use std::path::Path;

use cnb_assets_core::error::{AssetError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::manifest::{
    ImageIndexEntry, OciImageManifest, IMAGE_MANIFEST_MEDIA_TYPE, OCI_IMAGE_MEDIA_TYPE,
};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};

use super::layout::{blob_path, read_layout};
use crate::archive::{sha256_bytes, SHA256_PREFIX};
use super::reference::ImageReference;

const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// Registry credentials.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`, or anonymous when
    /// either is unset.
    pub fn from_env() -> Self {
        match (
            std::env::var("REGISTRY_USERNAME").ok(),
            std::env::var("REGISTRY_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Self::basic(username, password),
            _ => Self::anonymous(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

fn registry_error(reference: &ImageReference, message: String) -> AssetError {
    AssetError::RegistryError {
        registry: reference.registry.clone(),
        message,
    }
}

/// Pulls images into OCI layout directories.
pub struct RegistryPuller {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryPuller {
    pub fn new(auth: RegistryAuth) -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            platform_resolver: Some(Box::new(host_platform_resolver)),
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    /// Pull `reference` and write it as an OCI layout into `target_dir`.
    ///
    /// `index.json` is written last, so a layout interrupted mid-pull is
    /// not mistaken for a complete one.
    pub async fn pull(&self, reference: &ImageReference, target_dir: &Path) -> Result<()> {
        let oci_ref = reference.to_oci_reference()?;
        let auth = self.auth.to_oci_auth();

        tracing::info!(
            reference = %reference,
            target = %target_dir.display(),
            "Pulling asset image"
        );

        std::fs::create_dir_all(target_dir.join("blobs").join("sha256")).map_err(|e| {
            registry_error(reference, format!("failed to create layout directory: {}", e))
        })?;

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| registry_error(reference, format!("failed to pull manifest: {}", e)))?;

        let manifest_json = self
            .pull_manifest_bytes(reference, &oci_ref, &manifest_digest)
            .await?;
        write_blob(target_dir, &manifest_digest, &manifest_json)
            .map_err(|e| registry_error(reference, e))?;

        self.pull_blobs(reference, &oci_ref, &manifest, target_dir)
            .await?;

        std::fs::write(
            target_dir.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .map_err(|e| registry_error(reference, format!("failed to write oci-layout: {}", e)))?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": MANIFEST_MEDIA_TYPE,
                "digest": manifest_digest,
                "size": manifest_json.len(),
                "annotations": {
                    "org.opencontainers.image.ref.name": reference.full_reference()
                }
            }]
        });
        std::fs::write(
            target_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )
        .map_err(|e| registry_error(reference, format!("failed to write index.json: {}", e)))?;

        tracing::info!(
            reference = %reference,
            digest = %manifest_digest,
            "Asset image pulled"
        );
        Ok(())
    }

    /// Manifest bytes exactly as the registry serves them under `digest`.
    async fn pull_manifest_bytes(
        &self,
        reference: &ImageReference,
        oci_ref: &Reference,
        digest: &str,
    ) -> Result<Vec<u8>> {
        let by_digest = Reference::with_digest(
            oci_ref.registry().to_string(),
            oci_ref.repository().to_string(),
            digest.to_string(),
        );
        let (bytes, _) = self
            .client
            .pull_manifest_raw(
                &by_digest,
                &self.auth.to_oci_auth(),
                &[OCI_IMAGE_MEDIA_TYPE, IMAGE_MANIFEST_MEDIA_TYPE],
            )
            .await
            .map_err(|e| registry_error(reference, format!("failed to pull manifest: {}", e)))?;
        verify_digest(digest, &bytes).map_err(|e| registry_error(reference, e))?;
        Ok(bytes)
    }

    async fn pull_blobs(
        &self,
        reference: &ImageReference,
        oci_ref: &Reference,
        manifest: &OciImageManifest,
        target_dir: &Path,
    ) -> Result<()> {
        for descriptor in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
            tracing::debug!(digest = %descriptor.digest, size = descriptor.size, "Pulling blob");

            let mut data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(oci_ref, descriptor, &mut data)
                .await
                .map_err(|e| {
                    registry_error(
                        reference,
                        format!("failed to pull blob {}: {}", descriptor.digest, e),
                    )
                })?;
            write_blob(target_dir, &descriptor.digest, &data)
                .map_err(|e| registry_error(reference, e))?;
        }
        Ok(())
    }
}

/// Check that `data` hashes to `digest`.
fn verify_digest(digest: &str, data: &[u8]) -> std::result::Result<(), String> {
    let actual = format!("{}{}", SHA256_PREFIX, sha256_bytes(data));
    if actual != digest {
        return Err(format!("digest mismatch: expected {}, got {}", digest, actual));
    }
    Ok(())
}

fn write_blob(root_dir: &Path, digest: &str, data: &[u8]) -> std::result::Result<(), String> {
    std::fs::write(blob_path(root_dir, digest), data)
        .map_err(|e| format!("failed to write blob {}: {}", digest, e))
}

/// Publishes OCI layout directories to registries.
pub struct RegistryPusher {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryPusher {
    pub fn new(auth: RegistryAuth) -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    /// Push the layout at `image_dir` as `reference`, returning the
    /// manifest URL.
    pub async fn push(&self, reference: &ImageReference, image_dir: &Path) -> Result<String> {
        let oci_ref = reference.to_oci_reference()?;
        let contents = read_layout(image_dir)?;

        tracing::info!(
            reference = %reference,
            source = %image_dir.display(),
            layers = contents.layers.len(),
            "Pushing asset image"
        );

        let config_data = std::fs::read(blob_path(image_dir, &contents.config_digest))
            .map_err(|e| AssetError::OciImageError(format!("failed to read config blob: {}", e)))?;
        let config = Config::new(config_data, CONFIG_MEDIA_TYPE.to_string(), None);

        let mut layers = Vec::with_capacity(contents.layers.len());
        for layer in &contents.layers {
            let data = std::fs::read(&layer.path).map_err(|e| {
                AssetError::OciImageError(format!(
                    "failed to read layer blob {}: {}",
                    layer.digest, e
                ))
            })?;
            layers.push(ImageLayer::new(data, layer.media_type.clone(), None));
        }

        let response = self
            .client
            .push(&oci_ref, &layers, config, &self.auth.to_oci_auth(), None)
            .await
            .map_err(|e| registry_error(reference, format!("failed to push image: {}", e)))?;

        tracing::info!(
            reference = %reference,
            manifest_url = %response.manifest_url,
            "Asset image pushed"
        );
        Ok(response.manifest_url)
    }
}

/// Registry naming of the host CPU architecture.
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Prefer the linux image for the host architecture, else the first entry.
fn host_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = host_architecture();
    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .or_else(|| manifests.first())
        .map(|entry| entry.digest.clone())
}
