//! # invoice-extract
//!
//! Extract structured invoice data from scanned images and PDFs with Vision
//! Language Models (VLMs), review it, and export it to CSV.
//!
//! ## Workflow
//!
//! ```text
//! files/URLs
//!  │
//!  ├─ 1. Input     load local files or download URLs
//!  ├─ 2. Session   one IDLE SessionItem per document, first one selected
//!  ├─ 3. Encode    bytes → base64 data URI
//!  ├─ 4. Extract   one VLM call per document, strictly sequential
//!  ├─ 5. Review    inspect / edit the InvoiceData of each document
//!  └─ 6. Export    SUCCESS documents → BOM-prefixed CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_extract::{
//!     build_export_today, resolve_input, write_export, ExtractionConfig, LlmExtractor,
//!     Orchestrator, SessionStore, TempFilePreviews,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let store = Arc::new(SessionStore::new(Arc::new(TempFilePreviews::new()?)));
//!     store.add(vec![resolve_input("invoice.pdf", 120).await?])?;
//!
//!     let extractor = Arc::new(LlmExtractor::from_config(&config)?);
//!     let orchestrator = Orchestrator::new(store.clone(), extractor, config);
//!     orchestrator.analyze_pending().await;
//!
//!     if let Some(export) = build_export_today(&store.snapshot())? {
//!         write_export(&export, ".").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_FAILURE_MESSAGE};
pub use error::{DocumentError, ExtractionError, InvoiceError};
pub use export::{build_export, build_export_today, write_export, CsvExport};
pub use model::{InvoiceData, InvoiceEdit, LineItem, LineItemEdit};
pub use orchestrator::{BatchSummary, Orchestrator};
pub use pipeline::encode::{encode_document, EncodedDocument};
pub use pipeline::extract::{parse_invoice, InvoiceExtractor, LlmExtractor};
pub use pipeline::input::{resolve_input, SourceFile};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::preview::{PreviewProvider, PreviewRef, TempFilePreviews};
pub use session::{
    DocumentId, DocumentStatus, DocumentUpdate, SessionItem, SessionSnapshot, SessionStore,
};
