//! Drive documents through extraction and record the outcome in the session.
//!
//! ## Sequential batches
//!
//! [`Orchestrator::analyze_pending`] processes documents strictly one after
//! another: request *i + 1* is only issued after document *i*'s final status
//! has been written to the store. This keeps a large upload from flooding the
//! inference endpoint with parallel requests. Nothing in the store requires
//! the serialisation; it is purely a back-pressure policy.
//!
//! Failures stay per-document. Whether the extractor returns an error or
//! panics, the document ends in ERROR with the configured failure message,
//! the cause is logged, and the batch moves on. A started analysis always
//! reaches SUCCESS or ERROR: if the `analyze` future is dropped mid-request
//! (timeout, `select!`, task abort) the document is marked failed.

use crate::config::ExtractionConfig;
use crate::error::{DocumentError, InvoiceError};
use crate::pipeline::encode::encode_document;
use crate::pipeline::extract::InvoiceExtractor;
use crate::session::{DocumentId, DocumentStatus, DocumentUpdate, SessionStore};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Documents that were picked up (IDLE or ERROR at batch start).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Documents removed or already taken by another caller before their turn.
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Runs the per-document extraction workflow against a [`SessionStore`].
pub struct Orchestrator {
    store: Arc<SessionStore>,
    extractor: Arc<dyn InvoiceExtractor>,
    config: ExtractionConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        extractor: Arc<dyn InvoiceExtractor>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Analyse a single document.
    ///
    /// Returns the document's final status. `Err` means analysis never
    /// started: the id is unknown, or the document is already ANALYZING or
    /// SUCCESS. Extraction failures are not errors here; they leave the
    /// document in [`DocumentStatus::Error`].
    pub async fn analyze(&self, id: &DocumentId) -> Result<DocumentStatus, InvoiceError> {
        self.analyze_indexed(id, 1, 1).await
    }

    /// Analyse every IDLE or ERROR document, in list order, one at a time.
    pub async fn analyze_pending(&self) -> BatchSummary {
        let start = Instant::now();
        let pending = self.store.snapshot().pending_ids();
        let total = pending.len();
        let mut summary = BatchSummary {
            attempted: total,
            ..Default::default()
        };

        if total == 0 {
            debug!("No pending documents to analyse");
            return summary;
        }

        info!("Analysing {} pending document(s)", total);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        for (i, id) in pending.iter().enumerate() {
            match self.analyze_indexed(id, i + 1, total).await {
                Ok(DocumentStatus::Success) => summary.succeeded += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    debug!("Skipping document {}: {}", id, e);
                    summary.skipped += 1;
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {}/{} succeeded, {} failed, {} skipped, {}ms",
            summary.succeeded, total, summary.failed, summary.skipped, summary.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, summary.succeeded);
        }
        summary
    }

    async fn analyze_indexed(
        &self,
        id: &DocumentId,
        index: usize,
        total: usize,
    ) -> Result<DocumentStatus, InvoiceError> {
        let file = self.store.begin_analysis(id)?;
        let in_flight = InFlight {
            store: &self.store,
            id,
            failure_message: &self.config.failure_message,
            finished: false,
        };
        let started = Instant::now();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(index, total, &file.name);
        }
        info!("Analysing {} ({}, {} bytes)", file.name, file.content_type, file.len());

        let encoded = encode_document(&file);
        let result = match AssertUnwindSafe(self.extractor.extract(&encoded))
            .catch_unwind()
            .await
        {
            Ok(result) => result.map_err(DocumentError::from),
            Err(payload) => Err(DocumentError::Panicked(panic_message(payload.as_ref()))),
        };

        let (update, status) = match result {
            Ok(data) => {
                info!(
                    "Extracted {}: invoice '{}', {} item(s), {:?}",
                    file.name,
                    data.invoice_number,
                    data.items.len(),
                    started.elapsed()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_complete(index, total, &file.name, data.items.len());
                }
                (DocumentUpdate::Succeeded(data), DocumentStatus::Success)
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", file.name, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_error(index, total, &file.name, &e.to_string());
                }
                (
                    DocumentUpdate::Failed(self.config.failure_message.clone()),
                    DocumentStatus::Error,
                )
            }
        };

        if !in_flight.finish(update) {
            debug!("Result for {} not applied; document left ANALYZING meanwhile", id);
        }
        Ok(status)
    }
}

/// A document between `begin_analysis` and its final update.
///
/// Dropped without [`finish`](Self::finish), it marks the document failed.
struct InFlight<'a> {
    store: &'a SessionStore,
    id: &'a DocumentId,
    failure_message: &'a str,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, update: DocumentUpdate) -> bool {
        self.finished = true;
        self.store.update(self.id, update)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("Analysis of {} was cancelled; marking it failed", self.id);
        self.store.update(
            self.id,
            DocumentUpdate::Failed(self.failure_message.to_string()),
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
