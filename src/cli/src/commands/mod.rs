//! CLI command definitions and dispatch.

mod create;
mod inspect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cnb_assets_core::AssetsConfig;
use tokio_util::sync::CancellationToken;

/// cnb-assets: build and inspect buildpack asset packages.
#[derive(Parser)]
#[command(name = "cnb-assets", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ~/.cnb-assets/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Package assets into an image or OCI layout directory
    Create(create::CreateArgs),
    /// Print the assets recorded in asset packages
    Inspect(inspect::InspectArgs),
}

/// Load the configuration file, falling back to defaults when it is absent.
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<AssetsConfig, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(|| AssetsConfig::default_home().join("config.yaml"));
    Ok(AssetsConfig::load_or_default(&path)?)
}

/// Token cancelled on Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config)?;
    match cli.command {
        Command::Create(args) => create::execute(args, &config).await,
        Command::Inspect(args) => inspect::execute(args, &config).await,
    }
}
