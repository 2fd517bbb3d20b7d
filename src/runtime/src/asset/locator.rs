//! Classifies asset references by the backend that must fetch them.

use std::fmt;
use std::path::{Path, PathBuf};

use cnb_assets_core::error::{AssetError, Result};

const URI_SCHEMES: [&str; 3] = ["http://", "https://", "file://"];

/// Backend responsible for a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Uri,
    Filepath,
    Image,
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorKind::Uri => f.write_str("uri"),
            LocatorKind::Filepath => f.write_str("file"),
            LocatorKind::Image => f.write_str("image"),
        }
    }
}

/// Classify `reference`.
///
/// In priority order: an explicit `http`, `https` or `file` scheme is a
/// URI; a path that exists (absolute, or relative to `working_dir`) is a
/// file; anything else is taken to be an image reference. Only a blank
/// reference is rejected.
pub fn locate(reference: &str, working_dir: &Path) -> Result<LocatorKind> {
    if reference.trim().is_empty() {
        return Err(AssetError::LocatorAmbiguous(reference.to_string()));
    }

    if has_uri_scheme(reference) {
        return Ok(LocatorKind::Uri);
    }

    if resolve_path(working_dir, reference).exists() {
        return Ok(LocatorKind::Filepath);
    }

    Ok(LocatorKind::Image)
}

/// Absolute references are kept, relative ones joined onto `working_dir`.
pub fn resolve_path(working_dir: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn has_uri_scheme(reference: &str) -> bool {
    URI_SCHEMES.iter().any(|scheme| {
        reference
            .get(..scheme.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}
