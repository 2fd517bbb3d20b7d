//! Local image store.
//!
//! Stands in for a container daemon: every image lives in its own OCI
//! layout directory named after its reference.

use std::path::{Path, PathBuf};

use cnb_assets_core::error::{AssetError, Result};

use super::layout::is_layout;
use super::reference::ImageReference;

/// Directory of OCI layouts keyed by image reference.
#[derive(Debug, Clone)]
pub struct ImageStore {
    store_dir: PathBuf,
}

impl ImageStore {
    /// Open the store, creating its directory if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self> {
        let store_dir = store_dir.as_ref();
        std::fs::create_dir_all(store_dir).map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            store_dir: store_dir.to_path_buf(),
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Layout directory for `reference`, whether or not it exists yet.
    pub fn path_for(&self, reference: &ImageReference) -> PathBuf {
        self.store_dir.join(reference.store_key())
    }

    /// Whether a complete layout is stored for `reference`.
    pub fn contains(&self, reference: &ImageReference) -> bool {
        is_layout(&self.path_for(reference))
    }

    /// Remove the stored layout for `reference`, if any.
    pub fn remove(&self, reference: &ImageReference) -> Result<()> {
        let path = self.path_for(reference);
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| {
                AssetError::OciImageError(format!(
                    "failed to remove stored image {}: {}",
                    reference, e
                ))
            })?;
            tracing::debug!(reference = %reference, "Removed stored image");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_layout(dir: &Path) {
        std::fs::create_dir_all(dir.join("blobs").join("sha256")).unwrap();
        std::fs::write(dir.join("oci-layout"), "{}").unwrap();
        std::fs::write(dir.join("index.json"), "{}").unwrap();
    }

    #[test]
    fn test_new_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("images");
        let store = ImageStore::new(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.store_dir(), dir.as_path());
    }

    #[test]
    fn test_contains_and_remove() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        let reference = ImageReference::parse("example.com/assets:v1").unwrap();

        assert!(!store.contains(&reference));
        fake_layout(&store.path_for(&reference));
        assert!(store.contains(&reference));

        store.remove(&reference).unwrap();
        assert!(!store.contains(&reference));
        store.remove(&reference).unwrap();
    }

    #[test]
    fn test_partial_layout_is_not_contained() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        let reference = ImageReference::parse("assets").unwrap();
        std::fs::create_dir_all(store.path_for(&reference).join("blobs")).unwrap();
        assert!(!store.contains(&reference));
    }

    #[test]
    fn test_distinct_references_get_distinct_paths() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        let a = ImageReference::parse("assets:v1").unwrap();
        let b = ImageReference::parse("assets:v2").unwrap();
        assert_ne!(store.path_for(&a), store.path_for(&b));

        let c = ImageReference::parse("org/a:b_c").unwrap();
        let d = ImageReference::parse("org/a_b:c").unwrap();
        assert_ne!(store.path_for(&c), store.path_for(&d));
    }
}
