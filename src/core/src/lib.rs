//! CNB Assets Core - Asset Package Content Model
//!
//! This module provides the identity records, content-provider and
//! source/target capability traits, errors and configuration shared by the
//! asset package tooling.

pub mod asset;
pub mod blob;
pub mod config;
pub mod error;
pub mod image;

// Re-export commonly used types
pub use asset::{AssetInfo, AssetMap, AssetValue};
pub use blob::{AssetBlob, Blob, BlobContent};
pub use config::{AssetsConfig, PullPolicy};
pub use error::{AssetError, Result, WritePhase};
pub use image::{read_asset_map, set_label_json, Image, Readable, Writable, LAYERS_LABEL};

/// CNB Assets version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
