//! Store-backed image fetching and creation.
//!
//! The [`ImageStore`] stands in for a daemon: fetched images are pulled into
//! it and new daemon images are saved there. Non-daemon images are pushed to
//! their registry on save.

use std::path::PathBuf;

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{Image, PullPolicy};
use tokio_util::sync::CancellationToken;

use super::image::LayoutImage;
use super::reference::ImageReference;
use super::registry::{RegistryAuth, RegistryPuller};
use super::store::ImageStore;
use crate::asset::{ImageFactory, ImageFetch};

/// Fetches images through the local store, pulling from registries as the
/// pull policy allows.
pub struct RegistryImageFetcher {
    store: ImageStore,
    puller: RegistryPuller,
}

impl RegistryImageFetcher {
    pub fn new(store: ImageStore, auth: RegistryAuth) -> Self {
        Self {
            store,
            puller: RegistryPuller::new(auth),
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Pull into a scratch directory, then move it into place.
    async fn pull_into_store(&self, reference: &ImageReference) -> Result<PathBuf> {
        let target = self.store.path_for(reference);
        let scratch = self
            .store
            .store_dir()
            .join(".tmp")
            .join(reference.store_key());
        if scratch.exists() {
            tokio::fs::remove_dir_all(&scratch).await?;
        }
        tokio::fs::create_dir_all(&scratch).await?;

        if let Err(e) = self.puller.pull(reference, &scratch).await {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
            return Err(e);
        }

        self.store.remove(reference)?;
        tokio::fs::rename(&scratch, &target).await.map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to store pulled image {}: {}",
                reference, e
            ))
        })?;
        tracing::info!(reference = %reference, path = %target.display(), "Stored pulled image");
        Ok(target)
    }
}

#[async_trait]
impl ImageFetch for RegistryImageFetcher {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        name: &str,
        daemon: bool,
        pull_policy: PullPolicy,
    ) -> Result<Box<dyn Image>> {
        let reference = ImageReference::parse(name)?;
        let stored = self.store.contains(&reference);

        let pull = match (daemon, pull_policy) {
            (false, _) | (true, PullPolicy::Always) => true,
            (true, PullPolicy::IfNotPresent) => !stored,
            (true, PullPolicy::Never) => {
                if !stored {
                    return Err(AssetError::OciImageError(format!(
                        "image {} not found in local store and pull policy is never",
                        reference
                    )));
                }
                false
            }
        };

        let dir = if pull {
            crate::asset::cancellable(
                cancel,
                &format!("pulling image {}", reference),
                self.pull_into_store(&reference),
            )
            .await?
        } else {
            tracing::debug!(reference = %reference, "Using stored image");
            self.store.path_for(&reference)
        };

        Ok(Box::new(LayoutImage::load(name, dir)?))
    }
}

/// Creates empty images: daemon images save into the store, the rest push
/// to their registry. A stored image under the same name is only replaced
/// once the new one saves.
pub struct LayoutImageFactory {
    store: ImageStore,
    auth: RegistryAuth,
}

impl LayoutImageFactory {
    pub fn new(store: ImageStore, auth: RegistryAuth) -> Self {
        Self { store, auth }
    }
}

#[async_trait]
impl ImageFactory for LayoutImageFactory {
    async fn new_image(&self, name: &str, daemon: bool, os: &str) -> Result<Box<dyn Image>> {
        let reference = ImageReference::parse(name)?;
        if daemon {
            let dir = self.store.path_for(&reference);
            Ok(Box::new(LayoutImage::new(name, os, dir)))
        } else {
            Ok(Box::new(LayoutImage::remote(reference, os, self.auth.clone())))
        }
    }
}
