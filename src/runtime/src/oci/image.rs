//! Writable images backed by an OCI layout.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{Image, Readable, Writable};
use tempfile::TempDir;

use super::layout::{blob_path, find_layer, read_layout, LayoutLayer};
use super::reference::ImageReference;
use super::registry::{host_architecture, RegistryAuth, RegistryPusher};
use crate::archive::{sha256_bytes, sha256_file, NORMALIZED_TIMESTAMP, SHA256_PREFIX};

/// Media type of the uncompressed layers this image writes.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";

/// Where [`LayoutImage::save`] puts the image.
#[derive(Debug, Clone)]
pub enum ImageDestination {
    /// An OCI layout directory on disk.
    Directory(PathBuf),
    /// A registry; the layout is staged in a temporary directory and pushed.
    Registry {
        reference: ImageReference,
        auth: RegistryAuth,
    },
}

/// An image assembled in memory and persisted as an OCI layout.
///
/// Layer files are copied when added, so callers may delete or reuse
/// their paths immediately afterwards.
pub struct LayoutImage {
    name: String,
    os: String,
    architecture: String,
    labels: BTreeMap<String, String>,
    layers: Vec<LayoutLayer>,
    destination: ImageDestination,
    staging: Option<TempDir>,
}

impl LayoutImage {
    /// Empty image saved as a layout at `dir`.
    pub fn new(name: impl Into<String>, os: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::with_destination(name, os, ImageDestination::Directory(dir.into()))
    }

    /// Empty image pushed to the registry named by `reference`.
    pub fn remote(reference: ImageReference, os: impl Into<String>, auth: RegistryAuth) -> Self {
        let name = reference.full_reference();
        Self::with_destination(name, os, ImageDestination::Registry { reference, auth })
    }

    fn with_destination(
        name: impl Into<String>,
        os: impl Into<String>,
        destination: ImageDestination,
    ) -> Self {
        Self {
            name: name.into(),
            os: os.into(),
            architecture: host_architecture().to_string(),
            labels: BTreeMap::new(),
            layers: Vec::new(),
            destination,
            staging: None,
        }
    }

    /// Open the layout at `dir`; saving writes back to the same directory.
    pub fn load(name: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let contents = read_layout(&dir)?;
        Ok(Self {
            name: name.into(),
            os: contents.os,
            architecture: contents.architecture,
            labels: contents.labels.into_iter().collect(),
            layers: contents.layers,
            destination: ImageDestination::Directory(dir),
            staging: None,
        })
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn layers(&self) -> &[LayoutLayer] {
        &self.layers
    }

    pub fn destination(&self) -> &ImageDestination {
        &self.destination
    }

    fn staging_dir(&mut self) -> Result<PathBuf> {
        if self.staging.is_none() {
            self.staging = Some(tempfile::Builder::new().prefix("layout-image").tempdir()?);
        }
        self.staging
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| AssetError::Other("image staging directory unavailable".to_string()))
    }

    /// Write the image as an OCI layout into `dir`, returning the manifest digest.
    pub fn write_layout(&self, dir: &Path) -> Result<String> {
        let blobs_dir = dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir).map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to create blobs directory in {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut layer_descriptors = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let target = blob_path(dir, &layer.digest);
            if !target.exists() {
                std::fs::copy(&layer.path, &target).map_err(|e| {
                    AssetError::OciImageError(format!(
                        "failed to copy layer {}: {}",
                        layer.digest, e
                    ))
                })?;
            }
            let size = std::fs::metadata(&target)?.len();
            layer_descriptors.push(serde_json::json!({
                "mediaType": layer.media_type,
                "digest": layer.digest,
                "size": size
            }));
        }

        let config = serde_json::json!({
            "architecture": self.architecture,
            "os": self.os,
            "created": NORMALIZED_TIMESTAMP,
            "config": { "Labels": self.labels },
            "rootfs": {
                "type": "layers",
                "diff_ids": self.layers.iter().map(|l| l.diff_id.as_str()).collect::<Vec<_>>()
            },
            "history": []
        });
        let config_bytes = serde_json::to_vec(&config)?;
        let config_digest = write_json_blob(dir, &config_bytes)?;

        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config_bytes.len()
            },
            "layers": layer_descriptors
        });
        let manifest_bytes = serde_json::to_vec(&manifest)?;
        let manifest_digest = write_json_blob(dir, &manifest_bytes)?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest_bytes.len(),
                "annotations": {
                    "org.opencontainers.image.ref.name": self.name
                }
            }]
        });

        std::fs::write(dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).map_err(
            |e| AssetError::OciImageError(format!("failed to write oci-layout: {}", e)),
        )?;
        std::fs::write(dir.join("index.json"), serde_json::to_string_pretty(&index)?).map_err(
            |e| AssetError::OciImageError(format!("failed to write index.json: {}", e)),
        )?;

        Ok(manifest_digest)
    }
}

impl LayoutImage {
    /// Write the layout into a sibling staging directory, then swap it in
    /// for `dir`. A layout already at `dir` stays intact until the new one
    /// is complete.
    fn commit_layout(&mut self, dir: &Path) -> Result<String> {
        let parent = match dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        let staging = tempfile::Builder::new()
            .prefix(".layout-staging")
            .tempdir_in(&parent)?;
        let digest = self.write_layout(staging.path())?;

        let previous = tempfile::Builder::new()
            .prefix(".layout-previous")
            .tempdir_in(&parent)?;
        let displaced = previous.path().join("layout");
        let had_previous = dir.exists();
        if had_previous {
            std::fs::rename(dir, &displaced).map_err(|e| {
                AssetError::OciImageError(format!(
                    "failed to move aside existing layout {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        if let Err(e) = std::fs::rename(staging.path(), dir) {
            if had_previous {
                let _ = std::fs::rename(&displaced, dir);
            }
            return Err(AssetError::OciImageError(format!(
                "failed to move layout into {}: {}",
                dir.display(),
                e
            )));
        }

        for layer in &mut self.layers {
            layer.path = blob_path(dir, &layer.digest);
        }
        Ok(digest)
    }
}

fn write_json_blob(dir: &Path, bytes: &[u8]) -> Result<String> {
    let digest = format!("{}{}", SHA256_PREFIX, sha256_bytes(bytes));
    std::fs::write(blob_path(dir, &digest), bytes)
        .map_err(|e| AssetError::OciImageError(format!("failed to write blob {}: {}", digest, e)))?;
    Ok(digest)
}

impl Readable for LayoutImage {
    fn label(&self, key: &str) -> Result<Option<String>> {
        Ok(self.labels.get(key).cloned())
    }

    fn get_layer(&self, diff_id: &str) -> Result<Box<dyn Read + Send>> {
        find_layer(&self.layers, diff_id)?.open()
    }
}

impl Writable for LayoutImage {
    fn add_layer_with_diff_id(&mut self, path: &Path, diff_id: &str) -> Result<()> {
        let staged = self.staging_dir()?.join(self.layers.len().to_string());
        std::fs::copy(path, &staged).map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to stage layer {}: {}",
                path.display(),
                e
            ))
        })?;
        let digest = format!("{}{}", SHA256_PREFIX, sha256_file(&staged)?);

        tracing::debug!(diff_id = %diff_id, digest = %digest, image = %self.name, "Added layer");
        self.layers.push(LayoutLayer {
            diff_id: diff_id.to_string(),
            digest,
            media_type: LAYER_MEDIA_TYPE.to_string(),
            path: staged,
        });
        Ok(())
    }

    fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
        self.labels.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl Image for LayoutImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn os(&self) -> &str {
        &self.os
    }

    async fn save(&mut self) -> Result<()> {
        match self.destination.clone() {
            ImageDestination::Directory(dir) => {
                let digest = self.commit_layout(&dir)?;
                tracing::info!(
                    image = %self.name,
                    dir = %dir.display(),
                    digest = %digest,
                    "Saved image layout"
                );
            }
            ImageDestination::Registry { reference, auth } => {
                let staging = tempfile::Builder::new().prefix("push-layout").tempdir()?;
                self.write_layout(staging.path())?;
                RegistryPusher::new(auth)
                    .push(&reference, staging.path())
                    .await?;
            }
        }
        Ok(())
    }
}
