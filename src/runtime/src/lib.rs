//! Runtime for Cloud Native Buildpacks asset packages.
//!
//! Locates and fetches asset packages from files, URIs and images, and
//! writes assets into reproducible image layers.

#![allow(clippy::result_large_err)]

pub mod archive;
pub mod asset;
pub mod download;
pub mod oci;

pub use asset::{
    locate, AssetPackager, AssetWriter, CreateAssetPackageOptions, DownloadOption, Downloader,
    Fetcher, FetcherConfig, FetcherOption, ImageFactory, LayerWriter, LocatorKind, PackageFormat,
    ReadableAsset,
};
pub use download::HttpDownloader;
pub use oci::{
    ImageReference, ImageStore, LayoutImage, LayoutImageFactory, OciLayoutPackage, RegistryAuth,
    RegistryImageFetcher,
};

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
