//! Minimal `file://` URI mapping.
//!
//! The middleware exchanges destination and source locations as URIs, but
//! everything this service touches must live on the local filesystem. The
//! two helpers here translate in both directions without percent-encoding;
//! paths produced by [`to_file_uri`] round-trip through [`local_path`].

use std::path::{Path, PathBuf};

/// `file://` URI for a local path.
pub fn to_file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Local filesystem path named by `uri`.
///
/// Accepts `file://` URIs and bare absolute paths; anything carrying
/// another scheme (`http://`, `sftp://`, …) is not local and yields `None`.
pub fn local_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        if rest.is_empty() {
            return None;
        }
        return Some(PathBuf::from(rest));
    }
    if uri.contains("://") {
        return None;
    }
    if uri.starts_with('/') {
        return Some(PathBuf::from(uri));
    }
    None
}
