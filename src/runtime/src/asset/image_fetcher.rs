//! Fetches asset packages published as images.

use std::sync::Arc;

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{Image, PullPolicy};
use tokio_util::sync::CancellationToken;

use super::{cancellable, ensure_not_cancelled};

/// Resolves an image by name, from the local store (`daemon`) or a registry.
#[async_trait]
pub trait ImageFetch: Send + Sync {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        name: &str,
        daemon: bool,
        pull_policy: PullPolicy,
    ) -> Result<Box<dyn Image>>;
}

/// Opens asset packages named by image reference.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image_assets(
        &self,
        cancel: &CancellationToken,
        pull_policy: PullPolicy,
        names: &[String],
    ) -> Result<Vec<Box<dyn Image>>>;
}

/// Fetches every image through the local store, honoring the pull policy.
pub struct AssetImageFetcher {
    image_fetch: Arc<dyn ImageFetch>,
}

impl AssetImageFetcher {
    pub fn new(image_fetch: Arc<dyn ImageFetch>) -> Self {
        Self { image_fetch }
    }
}

#[async_trait]
impl ImageFetcher for AssetImageFetcher {
    async fn fetch_image_assets(
        &self,
        cancel: &CancellationToken,
        pull_policy: PullPolicy,
        names: &[String],
    ) -> Result<Vec<Box<dyn Image>>> {
        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let what = format!("fetching asset image {:?}", name);
            ensure_not_cancelled(cancel, &what)?;

            let image = cancellable(
                cancel,
                &what,
                self.image_fetch.fetch(cancel, name, true, pull_policy),
            )
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    e
                } else {
                    AssetError::Other(format!("unable to fetch asset image {:?}: {}", name, e))
                }
            })?;

            tracing::debug!(image = %name, pull_policy = %pull_policy, "Fetched asset image");
            images.push(image);
        }
        Ok(images)
    }
}
