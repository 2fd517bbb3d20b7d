//! Fetches asset packages from the local filesystem.

use std::path::Path;

use async_trait::async_trait;
use cnb_assets_core::error::{AssetError, Result};
use tokio_util::sync::CancellationToken;

use super::ensure_not_cancelled;
use super::locator::resolve_path;
use crate::oci::OciLayoutPackage;

/// Opens local asset packages.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Open each reference, resolved against `working_dir` when relative.
    async fn fetch_file_assets(
        &self,
        cancel: &CancellationToken,
        working_dir: &Path,
        references: &[String],
    ) -> Result<Vec<OciLayoutPackage>>;
}

/// Reads OCI layout directories and archives of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageFileFetcher;

impl PackageFileFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileFetcher for PackageFileFetcher {
    async fn fetch_file_assets(
        &self,
        cancel: &CancellationToken,
        working_dir: &Path,
        references: &[String],
    ) -> Result<Vec<OciLayoutPackage>> {
        let mut packages = Vec::with_capacity(references.len());
        for reference in references {
            ensure_not_cancelled(cancel, &format!("fetching file asset {:?}", reference))?;

            let path = resolve_path(working_dir, reference);
            if !path.exists() {
                return Err(AssetError::Other(format!(
                    "unable to fetch file asset {:?}: {} does not exist",
                    reference,
                    path.display()
                )));
            }

            let package = OciLayoutPackage::from_path(&path).map_err(|e| {
                AssetError::Other(format!("unable to read asset as OCI blob: {}", e))
            })?;
            tracing::debug!(path = %path.display(), "Opened file asset package");
            packages.push(package);
        }
        Ok(packages)
    }
}
