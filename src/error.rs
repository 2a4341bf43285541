//! Error types for the invoice-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`] — **Fatal to the call**: the operation cannot proceed
//!   at all (input file missing, unknown document id, provider not
//!   configured, export not writable). Returned as `Err(InvoiceError)`.
//!
//! * [`DocumentError`] — **Non-fatal**: a single document's data URI could
//!   not be read back, or its extraction failed or panicked. It is logged
//!   and surfaced on the document itself as an ERROR status, so one bad
//!   invoice never aborts a batch.

use crate::session::{DocumentId, DocumentStatus};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the invoice-extract library.
///
/// Per-document failures use [`DocumentError`] and end up on the
/// [`crate::session::SessionItem`] rather than propagating here.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Invoice file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Session errors ────────────────────────────────────────────────────
    /// No document with this id exists in the session.
    #[error("Document '{id}' is not part of the session")]
    DocumentNotFound { id: DocumentId },

    /// The document's status does not allow the requested transition.
    #[error("Document '{id}' cannot start analysis while {status}")]
    InvalidTransition { id: DocumentId, status: DocumentStatus },

    /// A field edit could not be applied.
    #[error("Invalid edit for document '{id}': {reason}")]
    InvalidEdit { id: DocumentId, reason: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the CSV export.
    #[error("Failed to write export file '{path}': {source}")]
    ExportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DocumentError {
    /// The source could not be turned into (or read back from) a data URI.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// The inference endpoint failed or returned an unusable reply.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The extractor panicked instead of returning.
    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// Why a single extraction attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// The endpoint answered without any text.
    #[error("the model returned an empty response")]
    EmptyResponse,

    /// The returned text is not JSON of the invoice schema.
    #[error("the model response does not match the invoice schema: {detail}")]
    InvalidResponse { detail: String },

    /// The endpoint call itself failed.
    #[error("LLM call failed: {detail}")]
    Provider { detail: String },

    /// The encoded payload could not be decoded before sending.
    #[error("payload is not a valid data URI: {detail}")]
    Encoding { detail: String },
}
