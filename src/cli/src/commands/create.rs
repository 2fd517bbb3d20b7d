//! `cnb-assets create` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use cnb_assets_core::{AssetInfo, AssetsConfig};
use cnb_assets_runtime::{
    AssetPackager, CreateAssetPackageOptions, HttpDownloader, ImageStore, LayoutImageFactory,
    PackageFormat, RegistryAuth,
};
use serde::Deserialize;

#[derive(Args)]
pub struct CreateArgs {
    /// Image reference, or output directory with `--format file`
    pub image: String,

    /// YAML file listing the assets to package
    #[arg(long)]
    pub assets: PathBuf,

    /// Operating system of the layers ("linux" or "windows")
    #[arg(long, default_value = "linux")]
    pub os: String,

    /// Output format ("image" or "file")
    #[arg(long, default_value = "image")]
    pub format: String,

    /// Push the image to its registry instead of the local store
    #[arg(long)]
    pub publish: bool,
}

/// Asset list file.
#[derive(Debug, Deserialize)]
struct AssetList {
    #[serde(default)]
    assets: Vec<AssetInfo>,
}

fn read_asset_list(path: &Path) -> Result<Vec<AssetInfo>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read asset list {}: {}", path.display(), e))?;
    let list: AssetList = serde_yaml::from_str(&content)?;
    Ok(list.assets)
}

pub async fn execute(args: CreateArgs, config: &AssetsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let format: PackageFormat = args.format.parse()?;
    let assets = read_asset_list(&args.assets)?;

    let store = ImageStore::new(&config.image_store_dir)?;
    let packager = AssetPackager::new(
        Arc::new(HttpDownloader::new(&config.cache_dir)),
        Arc::new(LayoutImageFactory::new(store, RegistryAuth::from_env())),
    );

    let options = CreateAssetPackageOptions {
        image_name: args.image.clone(),
        assets,
        publish: args.publish,
        os: args.os,
        format,
    };
    let metadata = packager
        .create_asset_package(&super::interrupt_token(), options)
        .await?;

    println!("Created {} ({} assets)", args.image, metadata.len());
    for (sha256, asset) in &metadata {
        println!("  {} {} {}", asset.id, asset.version, sha256);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_asset_list() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("assets.yaml");
        std::fs::write(
            &path,
            r#"
assets:
  - id: jdk
    name: OpenJDK
    version: "17.0.2"
    uri: https://example.com/jdk.tar.gz
    sha256: abc123
    stacks: [io.buildpacks.stacks.bionic]
  - id: local
    sha256: def456
"#,
        )
        .unwrap();

        let assets = read_asset_list(&path).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].version, "17.0.2");
        assert_eq!(assets[0].stacks, vec!["io.buildpacks.stacks.bionic"]);
        assert!(assets[1].uri.is_empty());
    }

    #[test]
    fn test_read_asset_list_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_asset_list(&tmp.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read asset list"));
    }
}
