//! OCI image layout reading.
//!
//! A layout directory holds `oci-layout`, `index.json` and
//! `blobs/<algorithm>/<hash>`. Asset packages may also arrive as a tar
//! archive of such a directory, optionally gzip-compressed.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use cnb_assets_core::error::{AssetError, Result};
use cnb_assets_core::{BlobContent, Readable};
use flate2::read::GzDecoder;
use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};
use tempfile::TempDir;

use crate::archive::digest::parse_digest;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One layer of a layout, bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLayer {
    /// Digest of the uncompressed layer.
    pub diff_id: String,
    /// Digest of the stored blob.
    pub digest: String,
    pub media_type: String,
    pub path: PathBuf,
}

impl LayoutLayer {
    pub fn is_gzip(&self) -> bool {
        self.media_type.ends_with("gzip")
    }

    /// Open the uncompressed layer stream.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path).map_err(|e| {
            AssetError::OciImageError(format!(
                "failed to open layer blob {}: {}",
                self.path.display(),
                e
            ))
        })?;
        if self.is_gzip() {
            Ok(Box::new(GzDecoder::new(BufReader::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// Parsed content of a layout directory.
#[derive(Debug, Clone, Default)]
pub struct LayoutContents {
    pub config_digest: String,
    pub os: String,
    pub architecture: String,
    pub labels: HashMap<String, String>,
    pub layers: Vec<LayoutLayer>,
}

/// Read the first manifest of the layout at `root_dir`.
pub fn read_layout(root_dir: &Path) -> Result<LayoutContents> {
    validate_layout(root_dir)?;

    let index: ImageIndex = read_json(&root_dir.join("index.json"), "index.json")?;
    let manifest_digest = index
        .manifests()
        .first()
        .ok_or_else(|| AssetError::OciImageError("no manifests in index.json".to_string()))?
        .digest()
        .to_string();

    let manifest: ImageManifest = read_json(&blob_path(root_dir, &manifest_digest), "manifest")?;
    let config_digest = manifest.config().digest().to_string();
    let config: ImageConfiguration = read_json(&blob_path(root_dir, &config_digest), "config")?;

    let labels = config
        .config()
        .as_ref()
        .and_then(|c| c.labels().clone())
        .unwrap_or_default();

    let diff_ids = config.rootfs().diff_ids();
    if diff_ids.len() != manifest.layers().len() {
        return Err(AssetError::OciImageError(format!(
            "config lists {} diff-ids but manifest has {} layers",
            diff_ids.len(),
            manifest.layers().len()
        )));
    }

    let layers = manifest
        .layers()
        .iter()
        .zip(diff_ids)
        .map(|(descriptor, diff_id)| {
            let digest = descriptor.digest().to_string();
            LayoutLayer {
                diff_id: diff_id.clone(),
                path: blob_path(root_dir, &digest),
                digest,
                media_type: descriptor.media_type().to_string(),
            }
        })
        .collect();

    Ok(LayoutContents {
        config_digest,
        os: config.os().to_string(),
        architecture: config.architecture().to_string(),
        labels,
        layers,
    })
}

/// Whether `root_dir` looks like a layout, without parsing it.
pub fn is_layout(root_dir: &Path) -> bool {
    validate_layout(root_dir).is_ok()
}

/// Path of the blob with `digest` under `root_dir`.
pub fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = parse_digest(digest);
    root_dir.join("blobs").join(algorithm).join(hash)
}

fn validate_layout(root_dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json", "blobs"] {
        if !root_dir.join(required).exists() {
            return Err(AssetError::OciImageError(format!(
                "not an OCI layout: missing {} in {}",
                required,
                root_dir.display()
            )));
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read(path).map_err(|e| {
        AssetError::OciImageError(format!("failed to read {} at {}: {}", what, path.display(), e))
    })?;
    serde_json::from_slice(&content)
        .map_err(|e| AssetError::OciImageError(format!("failed to parse {}: {}", what, e)))
}

/// A read-only asset package in OCI layout form.
pub struct OciLayoutPackage {
    root_dir: PathBuf,
    contents: LayoutContents,
    // Keeps an unpacked archive alive for the package's lifetime.
    _unpacked: Option<TempDir>,
}

impl std::fmt::Debug for OciLayoutPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciLayoutPackage")
            .field("root_dir", &self.root_dir)
            .field("layers", &self.contents.layers.len())
            .finish()
    }
}

impl OciLayoutPackage {
    /// Open a layout directory or an archive of one.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            let contents = read_layout(path)?;
            return Ok(Self {
                root_dir: path.to_path_buf(),
                contents,
                _unpacked: None,
            });
        }

        let file = File::open(path).map_err(|e| {
            AssetError::OciImageError(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::from_archive(BufReader::new(file))
    }

    /// Open downloaded or in-memory content.
    pub fn from_content(content: BlobContent) -> Result<Self> {
        match content {
            BlobContent::File(path) => Self::from_path(path),
            BlobContent::Bytes(bytes) => Self::from_archive(Cursor::new(bytes)),
        }
    }

    fn from_archive<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 2];
        let read = read_prefix(&mut reader, &mut magic)?;
        let stream = Cursor::new(magic[..read].to_vec()).chain(reader);

        let unpacked = tempfile::Builder::new().prefix("asset-package").tempdir()?;
        let result = if read == 2 && magic == GZIP_MAGIC {
            tar::Archive::new(GzDecoder::new(stream)).unpack(unpacked.path())
        } else {
            tar::Archive::new(stream).unpack(unpacked.path())
        };
        result.map_err(|e| {
            AssetError::OciImageError(format!("failed to unpack layout archive: {}", e))
        })?;

        let contents = read_layout(unpacked.path())?;
        tracing::debug!(
            dir = %unpacked.path().display(),
            layers = contents.layers.len(),
            "Unpacked asset package archive"
        );
        Ok(Self {
            root_dir: unpacked.path().to_path_buf(),
            contents,
            _unpacked: Some(unpacked),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn contents(&self) -> &LayoutContents {
        &self.contents
    }
}

impl Readable for OciLayoutPackage {
    fn label(&self, key: &str) -> Result<Option<String>> {
        Ok(self.contents.labels.get(key).cloned())
    }

    fn get_layer(&self, diff_id: &str) -> Result<Box<dyn Read + Send>> {
        find_layer(&self.contents.layers, diff_id)?.open()
    }
}

/// Layer with `diff_id`, if the layout has one.
pub fn find_layer<'a>(layers: &'a [LayoutLayer], diff_id: &str) -> Result<&'a LayoutLayer> {
    layers
        .iter()
        .find(|layer| layer.diff_id == diff_id)
        .ok_or_else(|| AssetError::OciImageError(format!("layer {} not found", diff_id)))
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::image::LayoutImage;
    use cnb_assets_core::{Image, Writable, LAYERS_LABEL};
    use std::io::Write;

    async fn write_layout(dir: &Path) -> (String, Vec<u8>) {
        let staging = TempDir::new().unwrap();
        let layer = staging.path().join("layer.tar");
        let layer_bytes = b"not really a tar but a layer".to_vec();
        std::fs::write(&layer, &layer_bytes).unwrap();
        let diff_id = format!("sha256:{}", crate::archive::sha256_bytes(&layer_bytes));

        let mut image = LayoutImage::new("test/assets", "linux", dir);
        image.add_layer_with_diff_id(&layer, &diff_id).unwrap();
        image.set_label(LAYERS_LABEL, "{}").unwrap();
        image.save().await.unwrap();
        (diff_id, layer_bytes)
    }

    fn tar_dir(dir: &Path) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_dir_all(".", dir).unwrap();
        builder.into_inner().unwrap()
    }

    #[tokio::test]
    async fn test_from_path_directory() {
        let tmp = TempDir::new().unwrap();
        let (diff_id, layer_bytes) = write_layout(tmp.path()).await;

        let package = OciLayoutPackage::from_path(tmp.path()).unwrap();
        assert_eq!(package.label(LAYERS_LABEL).unwrap().as_deref(), Some("{}"));
        assert_eq!(package.label("missing").unwrap(), None);
        assert_eq!(package.contents().os, "linux");

        let mut content = Vec::new();
        package.get_layer(&diff_id).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, layer_bytes);
    }

    #[tokio::test]
    async fn test_from_content_tar_and_gzip() {
        let tmp = TempDir::new().unwrap();
        let (diff_id, _) = write_layout(tmp.path()).await;
        let archive = tar_dir(tmp.path());

        let package = OciLayoutPackage::from_content(BlobContent::from(archive.clone())).unwrap();
        assert!(package.get_layer(&diff_id).is_ok());

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&archive).unwrap();
        let compressed = gz.finish().unwrap();
        let package = OciLayoutPackage::from_content(BlobContent::from(compressed)).unwrap();
        assert_eq!(package.label(LAYERS_LABEL).unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_archive_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        let layout = tmp.path().join("layout");
        std::fs::create_dir(&layout).unwrap();
        write_layout(&layout).await;
        let archive_path = tmp.path().join("package.tar");
        std::fs::write(&archive_path, tar_dir(&layout)).unwrap();

        let package = OciLayoutPackage::from_path(&archive_path).unwrap();
        assert_eq!(package.contents().layers.len(), 1);
    }

    #[test]
    fn test_not_a_layout() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_layout(tmp.path()));
        let err = OciLayoutPackage::from_path(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("missing oci-layout"));
    }

    #[test]
    fn test_garbage_content() {
        let err = OciLayoutPackage::from_content(BlobContent::from("not an archive")).unwrap_err();
        assert!(matches!(err, AssetError::OciImageError(_)));
    }

    #[tokio::test]
    async fn test_unknown_layer() {
        let tmp = TempDir::new().unwrap();
        write_layout(tmp.path()).await;
        let package = OciLayoutPackage::from_path(tmp.path()).unwrap();
        assert!(package.get_layer("sha256:unknown").is_err());
    }

    #[test]
    fn test_blob_path() {
        let root = Path::new("/layout");
        assert_eq!(
            blob_path(root, "sha256:abc"),
            PathBuf::from("/layout/blobs/sha256/abc")
        );
    }
}
