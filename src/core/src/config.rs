use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AssetError, Result};

/// When to pull an image from a registry instead of using a local copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Always pull, even if the image is present locally
    Always,

    /// Pull only when no local copy exists
    #[default]
    IfNotPresent,

    /// Never pull; the image must already be present locally
    Never,
}

impl FromStr for PullPolicy {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(PullPolicy::Always),
            "" | "if-not-present" => Ok(PullPolicy::IfNotPresent),
            "never" => Ok(PullPolicy::Never),
            other => Err(AssetError::ConfigError(format!(
                "invalid pull policy {:?}: expected always, if-not-present or never",
                other
            ))),
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match self {
            PullPolicy::Always => "always",
            PullPolicy::IfNotPresent => "if-not-present",
            PullPolicy::Never => "never",
        };
        f.write_str(policy)
    }
}

/// Asset tooling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory holding downloaded asset files, keyed by URI digest
    pub cache_dir: PathBuf,

    /// Directory holding OCI layouts of local images
    pub image_store_dir: PathBuf,

    /// Pull policy applied to image references
    pub pull_policy: PullPolicy,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        let home = Self::default_home();
        Self {
            cache_dir: home.join("download-cache"),
            image_store_dir: home.join("images"),
            pull_policy: PullPolicy::default(),
        }
    }
}

impl AssetsConfig {
    /// Root directory for all local state (`~/.cnb-assets`).
    pub fn default_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cnb-assets")
    }

    /// Load configuration from a YAML file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssetError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: AssetsConfig = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded assets config");
        Ok(config)
    }

    /// Load the configuration file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
