//! Asset layer writer.
//!
//! Packages asset blobs into one layer per blob, each holding
//! `/cnb/assets/<declared sha256>`, and records the resulting diff-ids in
//! the `io.buildpacks.asset.layers` label of the target.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use cnb_assets_core::error::{AssetError, Result, WritePhase};
use cnb_assets_core::{set_label_json, AssetMap, Blob, Writable, LAYERS_LABEL};
use tempfile::TempDir;

use crate::archive::{HashingWriter, TarEntry, TarWriter, TarWriterFactory, SHA256_PREFIX};

/// Groups assets into layers and writes them into a target.
pub trait LayerWriter {
    /// Allocate the private workspace used for layer files.
    fn open(&mut self) -> Result<()>;

    /// Release the workspace claimed by [`LayerWriter::open`].
    fn close(&mut self) -> Result<()>;

    /// Write one layer per added blob into `target`, then set the asset label.
    fn write<W: Writable + ?Sized>(&mut self, target: &mut W) -> Result<()>;

    /// Queue blobs for writing and record their provisional metadata.
    fn add_asset_blobs(&mut self, blobs: Vec<Box<dyn Blob>>);

    /// Metadata accumulated so far, keyed by declared sha256.
    fn asset_metadata(&self) -> &AssetMap;
}

/// Lifecycle state of an [`AssetWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Unopened,
    Open,
}

/// Writes asset blobs as layers.
///
/// Blobs sharing a declared sha256 share a metadata slot and a workspace
/// file: the last one added wins.
pub struct AssetWriter {
    workspace: Option<TempDir>,
    blobs: Vec<Box<dyn Blob>>,
    metadata: AssetMap,
    writer_factory: TarWriterFactory,
}

impl AssetWriter {
    pub fn new(writer_factory: TarWriterFactory) -> Self {
        Self {
            workspace: None,
            blobs: Vec::new(),
            metadata: AssetMap::new(),
            writer_factory,
        }
    }

    pub fn state(&self) -> WriterState {
        if self.workspace.is_some() {
            WriterState::Open
        } else {
            WriterState::Unopened
        }
    }

    /// Workspace directory while open.
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.workspace.as_ref().map(|dir| dir.path())
    }
}

impl LayerWriter for AssetWriter {
    fn open(&mut self) -> Result<()> {
        if self.workspace.is_some() {
            return Err(AssetError::WriterState(
                "unable to open writer: writer already open".to_string(),
            ));
        }

        let workspace = tempfile::Builder::new()
            .prefix("writer-workspace")
            .tempdir()?;
        tracing::debug!(workspace = %workspace.path().display(), "Opened asset writer");
        self.workspace = Some(workspace);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let workspace = self.workspace.take().ok_or_else(|| {
            AssetError::WriterState("unable to close writer: writer is not open".to_string())
        })?;
        workspace.close()?;
        Ok(())
    }

    fn write<W: Writable + ?Sized>(&mut self, target: &mut W) -> Result<()> {
        let workspace = self
            .workspace
            .as_ref()
            .ok_or_else(|| {
                AssetError::WriterState("AssetWriter must be opened before writing".to_string())
            })?
            .path()
            .to_path_buf();

        for blob in &self.blobs {
            let sha256 = blob.asset_info().sha256.clone();
            let layer_path = layer_file_path(&workspace, &sha256)?;

            let diff_id = create_asset_layer_file(&layer_path, blob.as_ref(), self.writer_factory)
                .map_err(|e| {
                    AssetError::layer_write(
                        WritePhase::LayerCreation,
                        format!("unable to create asset layer file: {}", e),
                    )
                })?;

            target
                .add_layer_with_diff_id(&layer_path, &diff_id)
                .map_err(|e| {
                    AssetError::layer_write(
                        WritePhase::LayerRegistration,
                        format!("unable to write layer: {}", e),
                    )
                })?;

            let value = self
                .metadata
                .get_mut(&sha256)
                .ok_or_else(|| AssetError::UnknownAsset(sha256.clone()))?;
            value.layer_diff_id = diff_id;

            tracing::debug!(
                sha256 = %sha256,
                diff_id = %value.layer_diff_id,
                "Added asset layer"
            );
        }

        set_label_json(target, LAYERS_LABEL, &self.metadata).map_err(|e| {
            AssetError::layer_write(
                WritePhase::LabelWrite,
                format!("unable to set {} label: {}", LAYERS_LABEL, e),
            )
        })?;

        tracing::info!(
            layers = self.blobs.len(),
            assets = self.metadata.len(),
            "Wrote asset layers"
        );
        Ok(())
    }

    fn add_asset_blobs(&mut self, blobs: Vec<Box<dyn Blob>>) {
        for blob in blobs {
            let info = blob.asset_info();
            self.metadata
                .insert(info.sha256.clone(), info.to_asset_value(""));
            self.blobs.push(blob);
        }
    }

    fn asset_metadata(&self) -> &AssetMap {
        &self.metadata
    }
}

/// Workspace file for a declared sha256, which must be a plain file name.
fn layer_file_path(workspace: &Path, sha256: &str) -> Result<PathBuf> {
    if sha256.is_empty() || sha256 == "." || sha256 == ".." || sha256.contains(['/', '\\']) {
        return Err(AssetError::layer_write(
            WritePhase::LayerCreation,
            format!("invalid asset sha256 {:?}", sha256),
        ));
    }
    Ok(workspace.join(sha256))
}

/// Write the asset layer for `blob` to `path`, returning its `sha256:` diff-id.
fn create_asset_layer_file(
    path: &Path,
    blob: &dyn Blob,
    writer_factory: TarWriterFactory,
) -> Result<String> {
    let file = File::create(path).map_err(|e| {
        AssetError::Other(format!(
            "unable to create layer file {}: {}",
            path.display(),
            e
        ))
    })?;
    let mut hashing = HashingWriter::new(BufWriter::new(file));

    let mut tar_writer = writer_factory.create(&mut hashing);
    write_asset_tar(tar_writer.as_mut(), blob)?;
    tar_writer.finish()?;

    let (_, digest) = hashing.finish()?;
    Ok(format!("{}{}", SHA256_PREFIX, digest))
}

fn write_asset_tar(tar_writer: &mut dyn TarWriter, blob: &dyn Blob) -> Result<()> {
    let sha256 = &blob.asset_info().sha256;

    tar_writer
        .write_entry(&TarEntry::dir("/cnb"), &[])
        .map_err(|e| {
            AssetError::Other(format!("writing asset package /cnb dir header: {}", e))
        })?;
    tar_writer
        .write_entry(&TarEntry::dir("/cnb/assets"), &[])
        .map_err(|e| {
            AssetError::Other(format!(
                "writing asset package /cnb/assets dir header: {}",
                e
            ))
        })?;

    let mut reader = blob.open().map_err(|e| {
        AssetError::Other(format!("unable to open blob for asset {:?}: {}", sha256, e))
    })?;
    let mut content = Vec::new();
    reader.read_to_end(&mut content).map_err(|e| {
        AssetError::Other(format!("unable to read blob contents for asset {:?}: {}", sha256, e))
    })?;

    tar_writer
        .write_entry(&TarEntry::file(format!("/cnb/assets/{}", sha256)), &content)
        .map_err(|e| {
            AssetError::Other(format!(
                "writing asset package /cnb/assets/{} file: {}",
                sha256, e
            ))
        })?;
    Ok(())
}
