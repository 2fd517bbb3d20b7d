//! Asset package fetching and writing.
//!
//! The [`Fetcher`] resolves asset references into [`ReadableAsset`]s; the
//! [`AssetWriter`] turns blobs into layers; [`AssetPackager`] ties both to
//! a downloader and an image factory to build whole packages.

use std::future::Future;

use cnb_assets_core::error::{AssetError, Result};
use tokio_util::sync::CancellationToken;

pub mod fetcher;
pub mod file_fetcher;
pub mod image_fetcher;
pub mod locator;
pub mod package;
pub mod uri_fetcher;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

pub use fetcher::{Fetcher, FetcherConfig, FetcherOption, ReadableAsset};
pub use file_fetcher::{FileFetcher, PackageFileFetcher};
pub use image_fetcher::{AssetImageFetcher, ImageFetch, ImageFetcher};
pub use locator::{locate, LocatorKind};
pub use package::{AssetPackager, CreateAssetPackageOptions, ImageFactory, PackageFormat};
pub use uri_fetcher::{AssetUriFetcher, DownloadOption, Downloader, UriFetcher};
pub use writer::{AssetWriter, LayerWriter, WriterState};

/// Fail fast when `cancel` has already fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken, what: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AssetError::Cancelled(what.to_string()));
    }
    Ok(())
}

/// Race `future` against `cancel`, surfacing [`AssetError::Cancelled`].
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AssetError::Cancelled(what.to_string())),
        result = future => result,
    }
}
