//! HTTP downloader with an on-disk cache.
//!
//! Downloads land in the cache directory under the SHA-256 of their URI,
//! with raw and gzip-decoded content cached apart, and are reused until a
//! [`DownloadOption::Refresh`] is requested. Local
//! `file://` URIs and plain paths are served in place.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::BlobContent;
use flate2::read::GzDecoder;
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::archive::sha256_bytes;
use crate::asset::{cancellable, ensure_not_cancelled, DownloadOption, Downloader};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Downloads `http`/`https` content into a cache directory.
pub struct HttpDownloader {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(cache_dir, reqwest::Client::new())
    }

    pub fn with_client(cache_dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location for `uri`; `raw` content is kept apart from decoded
    /// content of the same URI.
    pub fn cache_path(&self, uri: &str, raw: bool) -> PathBuf {
        let key = sha256_bytes(uri.as_bytes());
        if raw {
            self.cache_dir.join(format!("{}-raw", key))
        } else {
            self.cache_dir.join(key)
        }
    }

    async fn fetch_to_cache(&self, uri: &str, target: &Path, raw: bool) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            AssetError::Other(format!(
                "unable to create download cache {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;

        let download_error = |status_code: u16, message: String| AssetError::Download {
            url: uri.to_string(),
            status_code,
            message,
        };

        let mut response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| download_error(0, e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_error(
                response.status().as_u16(),
                "download failed".to_string(),
            ));
        }

        let partial = target.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_error(0, e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if !raw && is_gzip(&partial)? {
            let decoded = target.with_extension("decoded");
            decompress(&partial, &decoded)?;
            tokio::fs::rename(&decoded, &partial).await?;
        }
        tokio::fs::rename(&partial, target).await?;

        tracing::info!(uri = %uri, bytes = written, path = %target.display(), "Downloaded asset");
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        cancel: &CancellationToken,
        uri: &str,
        options: &[DownloadOption],
    ) -> Result<BlobContent> {
        ensure_not_cancelled(cancel, &format!("downloading {}", uri))?;

        let url = Url::parse(uri).ok().filter(|url| url.scheme().len() > 1);
        match url.as_ref().map(|url| url.scheme()) {
            Some("http") | Some("https") => {
                let raw = options.contains(&DownloadOption::Raw);
                let target = self.cache_path(uri, raw);
                let refresh = options.contains(&DownloadOption::Refresh);
                if target.exists() && !refresh {
                    tracing::debug!(uri = %uri, path = %target.display(), "Using cached download");
                    return Ok(BlobContent::File(target));
                }

                cancellable(
                    cancel,
                    &format!("downloading {}", uri),
                    self.fetch_to_cache(uri, &target, raw),
                )
                .await?;
                Ok(BlobContent::File(target))
            }
            Some("file") => {
                let path = url
                    .as_ref()
                    .and_then(|url| url.to_file_path().ok())
                    .ok_or_else(|| {
                        AssetError::Other(format!("unable to get file path from url {:?}", uri))
                    })?;
                local_content(path)
            }
            Some(scheme) => Err(AssetError::ConfigError(format!(
                "unable to download {:?}: unsupported scheme {:?}",
                uri, scheme
            ))),
            None => local_content(PathBuf::from(uri)),
        }
    }
}

fn local_content(path: PathBuf) -> Result<BlobContent> {
    if !path.is_file() {
        return Err(AssetError::Other(format!(
            "unable to find local asset {}",
            path.display()
        )));
    }
    Ok(BlobContent::File(path))
}

fn is_gzip(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = std::fs::File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        let n = file.read(&mut magic[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(magic == GZIP_MAGIC)
}

fn decompress(source: &Path, target: &Path) -> Result<()> {
    let mut decoder = GzDecoder::new(std::fs::File::open(source)?);
    let mut out = std::fs::File::create(target)?;
    std::io::copy(&mut decoder, &mut out).map_err(|e| {
        AssetError::Other(format!(
            "unable to decompress {}: {}",
            source.display(),
            e
        ))
    })?;
    Ok(())
}
