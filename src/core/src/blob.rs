//! Content providers for assets.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::asset::AssetInfo;
use crate::error::{AssetError, Result};

/// An asset content provider.
///
/// `open` may be called more than once (for retries); each call returns a
/// fresh stream positioned at the start of the content.
pub trait Blob: Send + Sync {
    /// Open a readable stream over the raw asset content.
    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Declared identity of the asset.
    fn asset_info(&self) -> &AssetInfo;
}

/// Where the bytes of a blob live.
#[derive(Debug, Clone)]
pub enum BlobContent {
    /// Content held in memory.
    Bytes(Arc<[u8]>),
    /// Content stored in a local file.
    File(PathBuf),
}

impl BlobContent {
    /// Open a fresh stream over the content.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            BlobContent::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            BlobContent::File(path) => {
                let file = File::open(path).map_err(|e| {
                    AssetError::Other(format!(
                        "unable to open blob {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Box::new(file))
            }
        }
    }
}

impl From<Vec<u8>> for BlobContent {
    fn from(bytes: Vec<u8>) -> Self {
        BlobContent::Bytes(bytes.into())
    }
}

impl From<&str> for BlobContent {
    fn from(text: &str) -> Self {
        BlobContent::Bytes(text.as_bytes().into())
    }
}

impl From<PathBuf> for BlobContent {
    fn from(path: PathBuf) -> Self {
        BlobContent::File(path)
    }
}

/// A declared asset paired with its content.
#[derive(Debug, Clone)]
pub struct AssetBlob {
    info: AssetInfo,
    content: BlobContent,
}

impl AssetBlob {
    pub fn new(info: AssetInfo, content: impl Into<BlobContent>) -> Self {
        Self {
            info,
            content: content.into(),
        }
    }

    pub fn content(&self) -> &BlobContent {
        &self.content
    }
}

impl Blob for AssetBlob {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.content.open()
    }

    fn asset_info(&self) -> &AssetInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_all(blob: &dyn Blob) -> String {
        let mut out = String::new();
        blob.open().unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_bytes_blob_reopens_from_start() {
        let blob = AssetBlob::new(AssetInfo::default(), "first asset contents");
        assert_eq!(read_all(&blob), "first asset contents");
        assert_eq!(read_all(&blob), "first asset contents");
    }

    #[test]
    fn test_file_blob() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("asset.bin");
        std::fs::write(&path, "on disk").unwrap();

        let info = AssetInfo {
            sha256: "disk-sha".to_string(),
            ..Default::default()
        };
        let blob = AssetBlob::new(info, path);
        assert_eq!(blob.asset_info().sha256, "disk-sha");
        assert_eq!(read_all(&blob), "on disk");
    }

    #[test]
    fn test_missing_file_blob() {
        let tmp = TempDir::new().unwrap();
        let blob = AssetBlob::new(AssetInfo::default(), tmp.path().join("missing"));
        let err = blob.open().err().unwrap();
        assert!(err.to_string().contains("unable to open blob"));
    }
}
