//! Fetches asset packages named by URI.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::BlobContent;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::file_fetcher::FileFetcher;
use super::{cancellable, ensure_not_cancelled};
use crate::oci::OciLayoutPackage;

/// Download behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadOption {
    /// Keep the content byte for byte, without decompressing it.
    Raw,
    /// Ignore any cached copy.
    Refresh,
}

/// Retrieves remote content.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        cancel: &CancellationToken,
        uri: &str,
        options: &[DownloadOption],
    ) -> Result<BlobContent>;
}

/// Opens asset packages named by URI.
#[async_trait]
pub trait UriFetcher: Send + Sync {
    async fn fetch_uri_assets(
        &self,
        cancel: &CancellationToken,
        references: &[String],
    ) -> Result<Vec<OciLayoutPackage>>;
}

/// Downloads `http`/`https` packages and hands `file` URIs to the file fetcher.
pub struct AssetUriFetcher {
    downloader: Arc<dyn Downloader>,
    file_fetcher: Arc<dyn FileFetcher>,
}

impl AssetUriFetcher {
    pub fn new(downloader: Arc<dyn Downloader>, file_fetcher: Arc<dyn FileFetcher>) -> Self {
        Self {
            downloader,
            file_fetcher,
        }
    }

    async fn fetch_one(&self, cancel: &CancellationToken, reference: &str) -> Result<OciLayoutPackage> {
        let url = Url::parse(reference).map_err(|e| {
            AssetError::Other(format!("unable to parse asset url {:?}: {}", reference, e))
        })?;

        match url.scheme() {
            "http" | "https" => {
                let content = cancellable(
                    cancel,
                    &format!("downloading {}", reference),
                    self.downloader.download(cancel, reference, &[DownloadOption::Raw]),
                )
                .await
                .map_err(|e| {
                    if e.is_cancelled() {
                        e
                    } else {
                        AssetError::Other(format!("unable to download asset {:?}: {}", reference, e))
                    }
                })?;

                OciLayoutPackage::from_content(content).map_err(|e| {
                    AssetError::Other(format!("unable to read asset as OCI blob: {}", e))
                })
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    AssetError::Other(format!("unable to get file path from url {:?}", reference))
                })?;
                let path = path.to_string_lossy().into_owned();
                let mut packages = self
                    .file_fetcher
                    .fetch_file_assets(cancel, Path::new(""), &[path])
                    .await?;
                packages.pop().ok_or_else(|| {
                    AssetError::Other(format!("no asset package found at {:?}", reference))
                })
            }
            scheme => Err(AssetError::ConfigError(format!(
                "unable to handle url scheme {:?}",
                scheme
            ))),
        }
    }
}

#[async_trait]
impl UriFetcher for AssetUriFetcher {
    async fn fetch_uri_assets(
        &self,
        cancel: &CancellationToken,
        references: &[String],
    ) -> Result<Vec<OciLayoutPackage>> {
        let mut packages = Vec::with_capacity(references.len());
        for reference in references {
            ensure_not_cancelled(cancel, &format!("fetching uri asset {:?}", reference))?;
            packages.push(self.fetch_one(cancel, reference).await?);
            tracing::debug!(uri = %reference, "Fetched uri asset package");
        }
        Ok(packages)
    }
}
