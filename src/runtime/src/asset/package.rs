//! Asset package creation.
//!
//! Downloads declared assets, writes one layer per asset into a new image
//! or OCI layout directory and saves it.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{AssetBlob, AssetInfo, AssetMap, Blob, Image};
use tokio_util::sync::CancellationToken;

use super::uri_fetcher::{DownloadOption, Downloader};
use super::writer::{AssetWriter, LayerWriter};
use super::{cancellable, ensure_not_cancelled};
use crate::archive::TarWriterFactory;
use crate::oci::LayoutImage;

/// Creates the images asset packages are written into.
#[async_trait]
pub trait ImageFactory: Send + Sync {
    /// A new empty image; `daemon` keeps it local instead of publishing it.
    async fn new_image(&self, name: &str, daemon: bool, os: &str) -> Result<Box<dyn Image>>;
}

/// Output form of an asset package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageFormat {
    /// An OCI layout directory at the image name.
    File,
    #[default]
    Image,
}

impl FromStr for PackageFormat {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(PackageFormat::File),
            "image" | "" => Ok(PackageFormat::Image),
            other => Err(AssetError::ConfigError(format!(
                "invalid package format {:?}: expected file or image",
                other
            ))),
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageFormat::File => f.write_str("file"),
            PackageFormat::Image => f.write_str("image"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateAssetPackageOptions {
    /// Image reference, or the output directory for [`PackageFormat::File`].
    pub image_name: String,
    pub assets: Vec<AssetInfo>,
    /// Push the image instead of keeping it in the local store.
    pub publish: bool,
    pub os: String,
    pub format: PackageFormat,
}

/// Builds asset packages from declared assets.
pub struct AssetPackager {
    downloader: Arc<dyn Downloader>,
    image_factory: Arc<dyn ImageFactory>,
}

impl AssetPackager {
    pub fn new(downloader: Arc<dyn Downloader>, image_factory: Arc<dyn ImageFactory>) -> Self {
        Self {
            downloader,
            image_factory,
        }
    }

    /// Create the package described by `options`, returning its asset map.
    pub async fn create_asset_package(
        &self,
        cancel: &CancellationToken,
        options: CreateAssetPackageOptions,
    ) -> Result<AssetMap> {
        let writer_factory = TarWriterFactory::for_os(&options.os).map_err(|e| {
            AssetError::Other(format!("unable to create layer tar writer: {}", e))
        })?;

        let mut image: Box<dyn Image> = match options.format {
            PackageFormat::File => Box::new(LayoutImage::new(
                options.image_name.as_str(),
                options.os.as_str(),
                PathBuf::from(&options.image_name),
            )),
            PackageFormat::Image => self
                .image_factory
                .new_image(&options.image_name, !options.publish, &options.os)
                .await
                .map_err(|e| {
                    AssetError::Other(format!("unable to create asset package base image: {}", e))
                })?,
        };

        let blobs = self
            .download_assets(cancel, &options.assets)
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    e
                } else {
                    AssetError::Other(format!("unable to download assets: {}", e))
                }
            })?;

        let mut writer = AssetWriter::new(writer_factory);
        writer.open()?;
        writer.add_asset_blobs(blobs);
        let written = writer.write(image.as_mut());
        let closed = writer.close();
        written.map_err(|e| {
            AssetError::Other(format!("unable to add asset blobs to assets package: {}", e))
        })?;
        closed?;

        image
            .save()
            .await
            .map_err(|e| AssetError::Other(format!("unable to save asset package: {}", e)))?;

        tracing::info!(
            image = %options.image_name,
            format = %options.format,
            os = %options.os,
            assets = writer.asset_metadata().len(),
            "Created asset package"
        );
        Ok(writer.asset_metadata().clone())
    }

    async fn download_assets(
        &self,
        cancel: &CancellationToken,
        assets: &[AssetInfo],
    ) -> Result<Vec<Box<dyn Blob>>> {
        let mut blobs: Vec<Box<dyn Blob>> = Vec::new();
        for asset in dedupe_by_sha256(assets) {
            if asset.uri.is_empty() {
                tracing::debug!(id = %asset.id, "Skipping asset without uri");
                continue;
            }

            let what = format!("downloading asset {:?}", asset.id);
            ensure_not_cancelled(cancel, &what)?;
            let content = cancellable(
                cancel,
                &what,
                self.downloader
                    .download(cancel, &asset.uri, &[DownloadOption::Raw]),
            )
            .await?;

            tracing::debug!(id = %asset.id, uri = %asset.uri, "Downloaded asset");
            blobs.push(Box::new(AssetBlob::new(asset.clone(), content)));
        }
        Ok(blobs)
    }
}

/// One asset per sha256, the last declaration winning, in order of first
/// appearance.
fn dedupe_by_sha256(assets: &[AssetInfo]) -> Vec<&AssetInfo> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&AssetInfo> = Vec::new();
    for asset in assets {
        match positions.get(asset.sha256.as_str()) {
            Some(&i) => unique[i] = asset,
            None => {
                positions.insert(asset.sha256.as_str(), unique.len());
                unique.push(asset);
            }
        }
    }
    unique
}
