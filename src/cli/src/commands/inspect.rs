//! `cnb-assets inspect` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use cnb_assets_core::{AssetMap, AssetsConfig, PullPolicy};
use cnb_assets_runtime::asset::{AssetImageFetcher, AssetUriFetcher, PackageFileFetcher};
use cnb_assets_runtime::{
    Fetcher, FetcherOption, HttpDownloader, ImageStore, ReadableAsset, RegistryAuth,
    RegistryImageFetcher,
};
use serde::Serialize;

#[derive(Args)]
pub struct InspectArgs {
    /// Asset package references: paths, URIs or image names
    #[arg(required = true)]
    pub references: Vec<String>,

    /// Image pull policy ("always", "if-not-present", "never")
    #[arg(long)]
    pub pull_policy: Option<String>,

    /// Base directory for relative paths
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
}

/// Fetcher wired to the HTTP downloader and the local image store.
fn build_fetcher(config: &AssetsConfig) -> Result<Fetcher, Box<dyn std::error::Error>> {
    let store = ImageStore::new(&config.image_store_dir)?;
    let file_fetcher = Arc::new(PackageFileFetcher::new());
    Ok(Fetcher::new(
        file_fetcher.clone(),
        Arc::new(AssetUriFetcher::new(
            Arc::new(HttpDownloader::new(&config.cache_dir)),
            file_fetcher,
        )),
        Arc::new(AssetImageFetcher::new(Arc::new(RegistryImageFetcher::new(
            store,
            RegistryAuth::from_env(),
        )))),
    ))
}

pub async fn execute(args: InspectArgs, config: &AssetsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pull_policy = match &args.pull_policy {
        Some(policy) => policy.parse::<PullPolicy>()?,
        None => config.pull_policy,
    };

    let mut options = vec![
        FetcherOption::PullPolicy(pull_policy),
        FetcherOption::Cancellation(super::interrupt_token()),
    ];
    if let Some(dir) = args.working_dir {
        options.push(FetcherOption::WorkingDir(dir));
    }

    let fetcher = build_fetcher(config)?;
    let mut report = Vec::with_capacity(args.references.len());
    for reference in &args.references {
        let assets = fetcher
            .fetch_assets(std::slice::from_ref(reference), options.clone())
            .await?;
        report.push(report_entry(reference, &assets)?);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Assets of one reference, in input order.
#[derive(Debug, Serialize)]
struct ReportEntry<'a> {
    reference: &'a str,
    assets: AssetMap,
}

/// Merge the asset maps of everything fetched for `reference`.
fn report_entry<'a>(
    reference: &'a str,
    fetched: &[ReadableAsset],
) -> Result<ReportEntry<'a>, Box<dyn std::error::Error>> {
    let mut assets = AssetMap::new();
    for asset in fetched {
        assets.extend(asset.asset_map()?);
    }
    Ok(ReportEntry { reference, assets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnb_assets_core::{AssetValue, Image, Writable, LAYERS_LABEL};
    use cnb_assets_runtime::{LayoutImage, LocatorKind, OciLayoutPackage};
    use tempfile::TempDir;

    async fn package(dir: &std::path::Path, sha256: &str, id: &str) -> ReadableAsset {
        let mut assets = AssetMap::new();
        assets.insert(
            sha256.to_string(),
            AssetValue {
                id: id.to_string(),
                ..Default::default()
            },
        );
        let mut image = LayoutImage::new("assets", "linux", dir);
        image
            .set_label(LAYERS_LABEL, &serde_json::to_string(&assets).unwrap())
            .unwrap();
        image.save().await.unwrap();
        ReadableAsset::Package {
            package: OciLayoutPackage::from_path(dir).unwrap(),
            origin: LocatorKind::Filepath,
        }
    }

    #[tokio::test]
    async fn test_report_keeps_repeated_references() {
        let tmp = TempDir::new().unwrap();
        let fetched = vec![package(&tmp.path().join("a"), "sha-a", "a").await];

        let report = vec![
            report_entry("./a", &fetched).unwrap(),
            report_entry("./a", &fetched).unwrap(),
        ];
        let json = serde_json::to_value(&report).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["reference"], "./a");
        assert_eq!(entries[1]["assets"]["sha-a"]["id"], "a");
    }

    #[tokio::test]
    async fn test_report_merges_multiple_sources() {
        let tmp = TempDir::new().unwrap();
        let fetched = vec![
            package(&tmp.path().join("a"), "sha-a", "a").await,
            package(&tmp.path().join("b"), "sha-b", "b").await,
        ];

        let entry = report_entry("ref", &fetched).unwrap();
        assert_eq!(entry.assets.len(), 2);
    }
}
