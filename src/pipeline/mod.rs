//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the extractor can be swapped without touching
//! input handling.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ extract
//! (path/URL)  (data URI)  (VLM → InvoiceData)
//! ```
//!
//! 1. [`input`]   — load a local file or download a URL into a `SourceFile`
//! 2. [`encode`]  — wrap the bytes in a base64 data URI
//! 3. [`extract`] — one VLM call with the fixed prompt and schema; the only
//!    stage with network I/O to the model

pub mod encode;
pub mod extract;
pub mod input;
