//! Input resolution: turn a user-supplied path or URL into a [`SourceFile`].
//!
//! No size or type validation happens here. A corrupt or oversized file is
//! loaded as-is and only surfaces later as a failed extraction, so one bad
//! upload never blocks the others.

use crate::error::InvoiceError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Content type used when the extension gives no hint.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An uploaded document: its display name, declared content type and bytes.
///
/// The bytes are shared so that cloning a session snapshot stays cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build a source file whose content type is guessed from `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let content_type = guess_content_type(&name);
        Self::new(name, content_type, bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Guess a MIME type from a file name's extension.
pub fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local path or download a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceFile, InvoiceError> {
    if input.trim().is_empty() {
        return Err(InvoiceError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

/// Read a local file into memory.
pub async fn load_local(path: &Path) -> Result<SourceFile, InvoiceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => InvoiceError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceFile::from_bytes(name, bytes))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceFile, InvoiceError> {
    info!("Downloading invoice from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let filename = extract_filename(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} ({} bytes)", filename, bytes.len());

    // Prefer the extension: servers often answer with a generic type.
    let content_type = match guess_content_type(&filename) {
        t if t == FALLBACK_CONTENT_TYPE => header_type.unwrap_or(t),
        t => t,
    };

    Ok(SourceFile::new(filename, content_type, bytes.to_vec()))
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-invoice".to_string()
}

/// Short name for an input, as shown before it is loaded.
pub fn display_name(input: &str) -> String {
    if is_url(input) {
        extract_filename(input)
    } else {
        PathBuf::from(input)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/inv.pdf"));
        assert!(is_url("http://example.com/inv.png"));
        assert!(!is_url("/tmp/inv.pdf"));
        assert!(!is_url("inv.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(guess_content_type("scan.PNG"), "image/png");
        assert_eq!(guess_content_type("scan.jpg"), "image/jpeg");
        assert_eq!(guess_content_type("invoice.pdf"), "application/pdf");
        assert_eq!(guess_content_type("noext"), FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://x.test/a/b/inv-9.pdf"), "inv-9.pdf");
        assert_eq!(extract_filename("https://x.test/a/"), "downloaded-invoice");
        assert_eq!(display_name("/tmp/dir/scan.png"), "scan.png");
    }

    #[tokio::test]
    async fn loads_local_file_without_validation() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        // Not a real PDF: the loader must not care.
        tmp.write_all(b"not really a pdf").unwrap();

        let file = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(&*file.bytes, b"not really a pdf");
        assert!(file.name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, InvoiceError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidInput { .. }));
    }
}
