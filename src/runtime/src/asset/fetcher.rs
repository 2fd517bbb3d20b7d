//! Multi-source asset fetching.
//!
//! The [`Fetcher`] classifies each reference with [`locate`] and hands it to
//! the matching backend. Results keep the order of the input references;
//! the first failure aborts the whole call.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{read_asset_map, AssetMap, Image, PullPolicy, Readable};
use tokio_util::sync::CancellationToken;

use super::ensure_not_cancelled;
use super::file_fetcher::FileFetcher;
use super::image_fetcher::ImageFetcher;
use super::locator::{locate, LocatorKind};
use super::uri_fetcher::UriFetcher;
use crate::oci::OciLayoutPackage;

/// A fetched asset package source.
pub enum ReadableAsset {
    /// An OCI layout read from disk or a download; `origin` is the kind of
    /// reference it was fetched from.
    Package {
        package: OciLayoutPackage,
        origin: LocatorKind,
    },
    /// An image from the local store or a registry.
    Image(Box<dyn Image>),
}

impl ReadableAsset {
    /// Kind of reference this asset was fetched from.
    pub fn kind(&self) -> LocatorKind {
        match self {
            ReadableAsset::Package { origin, .. } => *origin,
            ReadableAsset::Image(_) => LocatorKind::Image,
        }
    }

    /// Assets recorded in this source's label.
    pub fn asset_map(&self) -> Result<AssetMap> {
        read_asset_map(self)
    }
}

impl std::fmt::Debug for ReadableAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadableAsset::Package { package, origin } => f
                .debug_struct("Package")
                .field("package", package)
                .field("origin", origin)
                .finish(),
            ReadableAsset::Image(image) => f.debug_tuple("Image").field(&image.name()).finish(),
        }
    }
}

impl Readable for ReadableAsset {
    fn label(&self, key: &str) -> Result<Option<String>> {
        match self {
            ReadableAsset::Package { package, .. } => package.label(key),
            ReadableAsset::Image(image) => image.label(key),
        }
    }

    fn get_layer(&self, diff_id: &str) -> Result<Box<dyn Read + Send>> {
        match self {
            ReadableAsset::Package { package, .. } => package.get_layer(diff_id),
            ReadableAsset::Image(image) => image.get_layer(diff_id),
        }
    }
}

/// Settings for one [`Fetcher::fetch_assets`] call.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub cancel: CancellationToken,
    pub pull_policy: PullPolicy,
    /// Base for relative file references.
    pub working_dir: PathBuf,
}

impl FetcherConfig {
    /// A never-cancelled token, [`PullPolicy::IfNotPresent`] and the
    /// process working directory.
    pub fn try_default() -> Result<Self> {
        let working_dir = std::env::current_dir().map_err(|e| {
            AssetError::ConfigError(format!("unable to determine working directory: {}", e))
        })?;
        Ok(Self {
            cancel: CancellationToken::new(),
            pull_policy: PullPolicy::default(),
            working_dir,
        })
    }
}

/// One override of the default [`FetcherConfig`]. Options apply in order,
/// so later options win.
#[derive(Debug, Clone)]
pub enum FetcherOption {
    PullPolicy(PullPolicy),
    WorkingDir(PathBuf),
    Cancellation(CancellationToken),
}

impl FetcherOption {
    fn apply(self, config: &mut FetcherConfig) {
        match self {
            FetcherOption::PullPolicy(policy) => config.pull_policy = policy,
            FetcherOption::WorkingDir(dir) => config.working_dir = dir,
            FetcherOption::Cancellation(cancel) => config.cancel = cancel,
        }
    }
}

/// Dispatches references to the file, URI and image backends.
#[derive(Clone)]
pub struct Fetcher {
    file_fetcher: Arc<dyn FileFetcher>,
    uri_fetcher: Arc<dyn UriFetcher>,
    image_fetcher: Arc<dyn ImageFetcher>,
}

impl Fetcher {
    pub fn new(
        file_fetcher: Arc<dyn FileFetcher>,
        uri_fetcher: Arc<dyn UriFetcher>,
        image_fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            file_fetcher,
            uri_fetcher,
            image_fetcher,
        }
    }

    /// Fetch `references` with the defaults overridden by `options`.
    pub async fn fetch_assets(
        &self,
        references: &[String],
        options: Vec<FetcherOption>,
    ) -> Result<Vec<ReadableAsset>> {
        let mut config = FetcherConfig::try_default()?;
        for option in options {
            option.apply(&mut config);
        }
        self.fetch_assets_with_config(references, &config).await
    }

    pub async fn fetch_assets_with_config(
        &self,
        references: &[String],
        config: &FetcherConfig,
    ) -> Result<Vec<ReadableAsset>> {
        tracing::info!(
            references = references.len(),
            pull_policy = %config.pull_policy,
            working_dir = %config.working_dir.display(),
            "Fetching assets"
        );

        let mut assets = Vec::with_capacity(references.len());
        for reference in references {
            ensure_not_cancelled(&config.cancel, &format!("fetching asset {:?}", reference))?;

            let kind = locate(reference, &config.working_dir)?;
            tracing::debug!(reference = %reference, kind = %kind, "Located asset");

            let fetched = self
                .fetch_one(kind, reference, config)
                .await
                .map_err(|e| {
                    if e.is_cancelled() {
                        e
                    } else {
                        AssetError::FetchFailed {
                            backend: kind.to_string(),
                            reference: reference.clone(),
                            message: e.to_string(),
                        }
                    }
                })?;
            assets.extend(fetched);
        }
        Ok(assets)
    }

    async fn fetch_one(
        &self,
        kind: LocatorKind,
        reference: &str,
        config: &FetcherConfig,
    ) -> Result<Vec<ReadableAsset>> {
        let references = [reference.to_string()];
        let assets = match kind {
            LocatorKind::Filepath => self
                .file_fetcher
                .fetch_file_assets(&config.cancel, &config.working_dir, &references)
                .await?
                .into_iter()
                .map(|package| ReadableAsset::Package { package, origin: kind })
                .collect(),
            LocatorKind::Uri => self
                .uri_fetcher
                .fetch_uri_assets(&config.cancel, &references)
                .await?
                .into_iter()
                .map(|package| ReadableAsset::Package { package, origin: kind })
                .collect(),
            LocatorKind::Image => self
                .image_fetcher
                .fetch_image_assets(&config.cancel, config.pull_policy, &references)
                .await?
                .into_iter()
                .map(ReadableAsset::Image)
                .collect(),
        };
        Ok(assets)
    }
}
