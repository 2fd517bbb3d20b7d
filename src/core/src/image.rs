//! Capability traits for asset package sources and build targets.
//!
//! A source of packaged assets is [`Readable`] (an OCI layout package or an
//! image); a build target is [`Writable`]. [`Image`] is both, plus the
//! ability to persist itself.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::asset::AssetMap;
use crate::error::{AssetError, Result};

/// Label holding the JSON-encoded [`AssetMap`] of an asset package.
pub const LAYERS_LABEL: &str = "io.buildpacks.asset.layers";

/// Read access to packaged assets.
pub trait Readable {
    /// Value of an image label, `None` when the label is not set.
    fn label(&self, key: &str) -> Result<Option<String>>;

    /// Uncompressed tar content of the layer with the given diff-id.
    fn get_layer(&self, diff_id: &str) -> Result<Box<dyn Read + Send>>;
}

/// Write access to a build target.
pub trait Writable {
    /// Add the layer file at `path` whose uncompressed digest is `diff_id`.
    fn add_layer_with_diff_id(&mut self, path: &Path, diff_id: &str) -> Result<()>;

    fn set_label(&mut self, key: &str, value: &str) -> Result<()>;
}

/// An image that can be read, extended and persisted.
#[async_trait]
pub trait Image: Readable + Writable + Send + Sync {
    /// Reference the image was created or fetched under.
    fn name(&self) -> &str;

    /// Operating system of the image (`linux`, `windows`).
    fn os(&self) -> &str;

    /// Persist the image to wherever it belongs (local store, layout directory, registry).
    async fn save(&mut self) -> Result<()>;
}

/// Serialize `value` as JSON and set it as label `key`.
pub fn set_label_json<W, T>(target: &mut W, key: &str, value: &T) -> Result<()>
where
    W: Writable + ?Sized,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value)?;
    target.set_label(key, &json)
}

/// Read label `key` and decode it from JSON.
pub fn label_json<R, T>(source: &R, key: &str) -> Result<Option<T>>
where
    R: Readable + ?Sized,
    T: DeserializeOwned,
{
    match source.label(key)? {
        Some(raw) => {
            let value = serde_json::from_str(&raw).map_err(|e| {
                AssetError::SerializationError(format!("invalid JSON in label {}: {}", key, e))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Asset metadata of a package; an unlabeled source has no assets.
pub fn read_asset_map<R: Readable + ?Sized>(source: &R) -> Result<AssetMap> {
    Ok(label_json(source, LAYERS_LABEL)?.unwrap_or_default())
}
