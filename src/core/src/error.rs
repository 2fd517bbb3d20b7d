use std::fmt;

use thiserror::Error;

/// Phase of a layer write that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Building the layer tar, hashing it, or persisting it to the workspace.
    LayerCreation,
    /// Handing the finished layer to the target.
    LayerRegistration,
    /// Setting the asset metadata label on the target.
    LabelWrite,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            WritePhase::LayerCreation => "layer creation",
            WritePhase::LayerRegistration => "layer registration",
            WritePhase::LabelWrite => "label write",
        };
        f.write_str(phase)
    }
}

/// Asset package error types
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset reference could not be classified
    #[error("unable to determine asset type from name: {0:?}")]
    LocatorAmbiguous(String),

    /// One of the fetch backends failed for a reference
    #[error("unable to fetch asset {reference:?} of type {backend:?}: {message}")]
    FetchFailed {
        backend: String,
        reference: String,
        message: String,
    },

    /// Layer writer used out of order (open/close misuse)
    #[error("{0}")]
    WriterState(String),

    /// A blob reached the writer without a metadata entry
    #[error("unknown sha256 asset value {0}")]
    UnknownAsset(String),

    /// Layer construction or registration failed
    #[error("unable to add asset blobs ({phase}): {message}")]
    LayerWriteFailed { phase: WritePhase, message: String },

    /// Operation cancelled by the caller
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Asset download failed
    #[error("download failed: {url} -> {status_code}: {message}")]
    Download {
        url: String,
        status_code: u16,
        message: String,
    },

    /// OCI image or layout error
    #[error("OCI image error: {0}")]
    OciImageError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl AssetError {
    /// Build a layer write failure for the given phase.
    pub fn layer_write(phase: WritePhase, message: impl Into<String>) -> Self {
        AssetError::LayerWriteFailed {
            phase,
            message: message.into(),
        }
    }

    /// Whether this error came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssetError::Cancelled(_))
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AssetError {
    fn from(err: serde_yaml::Error) -> Self {
        AssetError::SerializationError(err.to_string())
    }
}

/// Result type alias for asset package operations
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failed_display() {
        let error = AssetError::FetchFailed {
            backend: "uri".to_string(),
            reference: "https://example.com/assets.tar".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "unable to fetch asset \"https://example.com/assets.tar\" of type \"uri\": connection refused"
        );
    }

    #[test]
    fn test_layer_write_failed_display() {
        let error = AssetError::layer_write(WritePhase::LayerCreation, "open blob error");
        assert_eq!(
            error.to_string(),
            "unable to add asset blobs (layer creation): open blob error"
        );
    }

    #[test]
    fn test_write_phase_display() {
        assert_eq!(WritePhase::LayerRegistration.to_string(), "layer registration");
        assert_eq!(WritePhase::LabelWrite.to_string(), "label write");
    }

    #[test]
    fn test_unknown_asset_display() {
        let error = AssetError::UnknownAsset("first-sha256".to_string());
        assert_eq!(error.to_string(), "unknown sha256 asset value first-sha256");
    }

    #[test]
    fn test_locator_ambiguous_display() {
        let error = AssetError::LocatorAmbiguous("  ".to_string());
        assert_eq!(
            error.to_string(),
            "unable to determine asset type from name: \"  \""
        );
    }

    #[test]
    fn test_download_error_display() {
        let error = AssetError::Download {
            url: "https://example.com/asset".to_string(),
            status_code: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "download failed: https://example.com/asset -> 404: Not Found"
        );
    }

    #[test]
    fn test_registry_error_display() {
        let error = AssetError::RegistryError {
            registry: "ghcr.io".to_string(),
            message: "Authentication failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registry error: ghcr.io - Authentication failed"
        );
    }

    #[test]
    fn test_cancelled() {
        let error = AssetError::Cancelled("fetching assets".to_string());
        assert!(error.is_cancelled());
        assert!(!AssetError::Other("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AssetError = io_error.into();
        assert!(matches!(error, AssetError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let error: AssetError = result.unwrap_err().into();
        assert!(matches!(error, AssetError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: AssetError = result.unwrap_err().into();
        assert!(matches!(error, AssetError::SerializationError(_)));
    }
}
