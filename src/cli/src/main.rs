//! cnb-assets CLI entry point.

use clap::Parser;
use cnb_assets_core::AssetError;
use tracing_subscriber::EnvFilter;

use cnb_assets_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        let cancelled = e
            .downcast_ref::<AssetError>()
            .is_some_and(AssetError::is_cancelled);
        std::process::exit(if cancelled { 130 } else { 1 });
    }
}
