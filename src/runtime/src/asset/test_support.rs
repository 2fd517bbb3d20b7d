//! Fakes and fixtures shared by the asset tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{BlobContent, Image, PullPolicy, Writable, LAYERS_LABEL};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::image_fetcher::ImageFetch;
use super::uri_fetcher::{DownloadOption, Downloader};
use crate::oci::LayoutImage;

/// Save an empty asset package carrying `label` into `dir`.
pub async fn write_package(dir: &Path, label: &str) {
    let mut image = LayoutImage::new("assets", "linux", dir);
    image.set_label(LAYERS_LABEL, label).unwrap();
    image.save().await.unwrap();
}

/// Tar archive of an asset package carrying `label`.
pub async fn package_archive(label: &str) -> Vec<u8> {
    let tmp = TempDir::new().unwrap();
    write_package(tmp.path(), label).await;
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", tmp.path()).unwrap();
    builder.into_inner().unwrap()
}

/// Downloader serving fixed content per URI and recording every call.
#[derive(Default)]
pub struct FakeDownloader {
    pub content: Mutex<std::collections::HashMap<String, BlobContent>>,
    pub calls: Mutex<Vec<(String, Vec<DownloadOption>)>>,
    /// Never completes, for cancellation tests.
    pub hang: bool,
}

impl FakeDownloader {
    pub fn with(entries: Vec<(&str, BlobContent)>) -> Arc<Self> {
        let downloader = Self::default();
        {
            let mut content = downloader.content.lock().unwrap();
            for (uri, blob) in entries {
                content.insert(uri.to_string(), blob);
            }
        }
        Arc::new(downloader)
    }

    pub fn called_uris(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(uri, _)| uri.clone()).collect()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        _cancel: &CancellationToken,
        uri: &str,
        options: &[DownloadOption],
    ) -> Result<BlobContent> {
        self.calls
            .lock()
            .unwrap()
            .push((uri.to_string(), options.to_vec()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.content
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| AssetError::Download {
                url: uri.to_string(),
                status_code: 404,
                message: "not found".to_string(),
            })
    }
}

/// Image source serving layouts from a directory keyed by name.
pub struct FakeImageFetch {
    pub images_dir: TempDir,
    pub calls: Mutex<Vec<(String, bool, PullPolicy)>>,
}

impl FakeImageFetch {
    pub fn new() -> Self {
        Self {
            images_dir: TempDir::new().unwrap(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn add(&self, name: &str, label: &str) {
        write_package(&self.images_dir.path().join(name.replace('/', "_")), label).await;
    }
}

#[async_trait]
impl ImageFetch for FakeImageFetch {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        name: &str,
        daemon: bool,
        pull_policy: PullPolicy,
    ) -> Result<Box<dyn Image>> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), daemon, pull_policy));
        let dir = self.images_dir.path().join(name.replace('/', "_"));
        if !dir.exists() {
            return Err(AssetError::OciImageError(format!("image {} not found", name)));
        }
        Ok(Box::new(LayoutImage::load(name, dir)?))
    }
}
