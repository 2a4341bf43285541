//! Displayable previews for uploaded documents.
//!
//! A preview is whatever a front-end needs to show the original document:
//! a file path, an object URL, a thumbnail key. The store asks a
//! [`PreviewProvider`] for one per upload and hands it back exactly once
//! when the document is removed.

use crate::error::InvoiceError;
use crate::pipeline::input::SourceFile;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Opaque reference to a document preview.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and releases previews for the session store.
pub trait PreviewProvider: Send + Sync {
    /// Create a preview for a newly added document.
    fn create(&self, file: &SourceFile) -> Result<PreviewRef, InvoiceError>;

    /// Release a preview. Called once per preview, when its document leaves
    /// the session.
    fn release(&self, preview: &PreviewRef);
}

/// Materialises each preview as a file inside a private temp directory.
///
/// The directory and anything still in it are deleted when the provider is
/// dropped.
pub struct TempFilePreviews {
    dir: TempDir,
}

impl TempFilePreviews {
    pub fn new() -> Result<Self, InvoiceError> {
        let dir = tempfile::Builder::new()
            .prefix("invoice-previews-")
            .tempdir()
            .map_err(|e| InvoiceError::Internal(format!("preview dir: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl PreviewProvider for TempFilePreviews {
    fn create(&self, file: &SourceFile) -> Result<PreviewRef, InvoiceError> {
        let path = self
            .dir
            .path()
            .join(format!("{}-{}", uuid::Uuid::new_v4(), sanitize(&file.name)));
        std::fs::write(&path, &file.bytes)
            .map_err(|e| InvoiceError::Internal(format!("preview write: {e}")))?;
        debug!("Preview for {} at {}", file.name, path.display());
        Ok(PreviewRef::new(path.to_string_lossy()))
    }

    fn release(&self, preview: &PreviewRef) {
        let path = PathBuf::from(preview.as_str());
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to release preview {}: {}", path.display(), e);
            }
        }
    }
}

/// Keep file names from escaping the preview directory.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
