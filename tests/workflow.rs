//! End-to-end workflow tests: upload → analyse → review → export.
//!
//! The inference endpoint is replaced by an in-process extractor that maps
//! each document's bytes to a scripted reply, so these tests run offline and
//! exercise the real session store, orchestrator, parser and exporter.

use async_trait::async_trait;
use chrono::NaiveDate;
use invoice_extract::{
    build_export, parse_invoice, DocumentStatus, DocumentUpdate, EncodedDocument,
    ExtractionConfig, ExtractionError, InvoiceData, InvoiceEdit, InvoiceError, InvoiceExtractor,
    LineItemEdit, Orchestrator, PreviewProvider, PreviewRef, SessionStore, SourceFile,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Replies with the raw model text registered for a document's bytes.
///
/// Tracks how many requests are in flight to prove batches never overlap.
struct FakeModel {
    replies: HashMap<Vec<u8>, Option<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeModel {
    fn new(replies: &[(&str, Option<&str>)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.map(str::to_string)))
                .collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InvoiceExtractor for FakeModel {
    async fn extract(&self, document: &EncodedDocument) -> Result<InvoiceData, ExtractionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (_, bytes) = document.decode().map_err(|e| ExtractionError::Encoding {
            detail: e.to_string(),
        })?;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let reply = self.replies.get(&bytes).cloned().flatten();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(text) => parse_invoice(&text),
            None => Err(ExtractionError::Provider {
                detail: "forced endpoint failure".into(),
            }),
        }
    }
}

#[derive(Default)]
struct CountingPreviews {
    released: Mutex<HashMap<String, usize>>,
}

impl PreviewProvider for CountingPreviews {
    fn create(&self, file: &SourceFile) -> Result<PreviewRef, InvoiceError> {
        Ok(PreviewRef::new(format!("blob:{}", file.name)))
    }

    fn release(&self, preview: &PreviewRef) {
        *self
            .released
            .lock()
            .unwrap()
            .entry(preview.to_string())
            .or_default() += 1;
    }
}

const WIDGET_REPLY: &str = r#"{
    "invoiceDate": "2024-05-02",
    "invoiceNumber": "INV-1001",
    "poNumber": "",
    "quotationNumber": "",
    "totalAmount": 1000,
    "currency": "USD",
    "items": [{"description": "Widget", "quantity": 2, "unitPrice": 500, "total": 1000}]
}"#;

fn session(files: Vec<SourceFile>) -> (Arc<SessionStore>, Arc<CountingPreviews>) {
    let previews = Arc::new(CountingPreviews::default());
    let store = Arc::new(SessionStore::new(previews.clone()));
    store.add(files).unwrap();
    (store, previews)
}

fn file(name: &str, bytes: &[u8]) -> SourceFile {
    SourceFile::from_bytes(name, bytes.to_vec())
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_uploads_one_failure_exports_single_row() {
    let (store, _) = session(vec![
        file("first.png", b"first"),
        file("second.pdf", b"second"),
    ]);
    let model = Arc::new(FakeModel::new(&[("first", Some(WIDGET_REPLY))]));
    let orch = Orchestrator::new(store.clone(), model, ExtractionConfig::default());

    let summary = orch.analyze_pending().await;
    assert_eq!((summary.succeeded, summary.failed), (1, 1));

    let snap = store.snapshot();
    assert_eq!(snap.items[0].status, DocumentStatus::Success);
    assert_eq!(snap.items[1].status, DocumentStatus::Error);
    assert!(!snap.items[1].error.as_deref().unwrap_or("").is_empty());

    let export = build_export(&snap, today()).unwrap().expect("one document qualifies");
    assert_eq!(export.rows, 1);
    let text = String::from_utf8(export.bytes[3..].to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2, "header + one row: {text}");
    assert!(lines[1].starts_with("\"first.png\""));
    assert!(lines[1].contains("\"Widget (Qty: 2, Unit: 500, Total: 1000)\""));
    assert!(!text.contains("second.pdf"));
}

#[tokio::test]
async fn batch_never_overlaps_requests() {
    let files: Vec<SourceFile> = (0..5)
        .map(|i| file(&format!("inv-{i}.png"), format!("doc-{i}").as_bytes()))
        .collect();
    let keys: Vec<String> = (0..5).map(|i| format!("doc-{i}")).collect();
    let replies: Vec<(&str, Option<&str>)> =
        keys.iter().map(|k| (k.as_str(), Some(WIDGET_REPLY))).collect();
    let model = Arc::new(FakeModel::new(&replies));
    let (store, _) = session(files);
    let orch = Orchestrator::new(store.clone(), model.clone(), ExtractionConfig::default());

    let summary = orch.analyze_pending().await;
    assert_eq!(summary.succeeded, 5);
    assert_eq!(model.calls.load(Ordering::SeqCst), 5);
    assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_document_can_be_retried_until_success() {
    let (store, _) = session(vec![file("a.png", b"a")]);
    let id = store.snapshot().items[0].id.clone();

    let unreachable = Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("a", None)])),
        ExtractionConfig::default(),
    );
    assert_eq!(unreachable.analyze(&id).await.unwrap(), DocumentStatus::Error);
    let prior = store.get(&id).unwrap().data;

    // Retry with an unparseable reply and a localised message.
    let garbled = Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("a", Some("not json at all"))])),
        ExtractionConfig::builder()
            .failure_message("Analyse fehlgeschlagen")
            .build()
            .unwrap(),
    );
    assert_eq!(garbled.analyze(&id).await.unwrap(), DocumentStatus::Error);
    let item = store.get(&id).unwrap();
    assert_eq!(item.error.as_deref(), Some("Analyse fehlgeschlagen"));
    assert_eq!(item.data, prior);

    let good = Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("a", Some(WIDGET_REPLY))])),
        ExtractionConfig::default(),
    );
    assert_eq!(good.analyze(&id).await.unwrap(), DocumentStatus::Success);
    assert_eq!(store.get(&id).unwrap().error, None);

    // SUCCESS is terminal: no re-analysis, no late result.
    assert!(matches!(
        good.analyze(&id).await,
        Err(InvoiceError::InvalidTransition { .. })
    ));
    assert!(!store.update(&id, DocumentUpdate::Failed("late".into())));
    let item = store.get(&id).unwrap();
    assert_eq!(item.status, DocumentStatus::Success);
    assert_eq!(item.data.unwrap().invoice_number, "INV-1001");
}

#[tokio::test]
async fn optional_fields_default_to_empty() {
    let reply = r#"{"invoiceDate":"2024-01-31","invoiceNumber":"7","totalAmount":12.5,
                    "items":[{"description":"Tea","quantity":1,"unitPrice":12.5,"total":12.5}]}"#;
    let (store, _) = session(vec![file("tea.jpg", b"tea")]);
    let orch = Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("tea", Some(reply))])),
        ExtractionConfig::default(),
    );
    orch.analyze_pending().await;

    let data = store.snapshot().items[0].data.clone().unwrap();
    assert_eq!(data.po_number, "");
    assert_eq!(data.quotation_number, "");
    assert_eq!(data.currency, "");
    assert_eq!(data.total_amount, 12.5);
}

#[tokio::test]
async fn removal_during_analysis_is_harmless() {
    let (store, previews) = session(vec![file("a.png", b"a"), file("b.png", b"b")]);
    let ids: Vec<_> = store.snapshot().items.iter().map(|i| i.id.clone()).collect();

    // Remove the document while its request is in flight.
    struct RemovingModel {
        store: Arc<SessionStore>,
    }
    #[async_trait]
    impl InvoiceExtractor for RemovingModel {
        async fn extract(&self, _doc: &EncodedDocument) -> Result<InvoiceData, ExtractionError> {
            let first = self.store.snapshot().items[0].id.clone();
            self.store.remove(&first);
            parse_invoice(WIDGET_REPLY)
        }
    }

    let orch = Orchestrator::new(
        store.clone(),
        Arc::new(RemovingModel { store: store.clone() }),
        ExtractionConfig::default(),
    );
    assert_eq!(orch.analyze(&ids[0]).await.unwrap(), DocumentStatus::Success);

    let snap = store.snapshot();
    assert_eq!(snap.items.len(), 1);
    assert_eq!(snap.items[0].id, ids[1]);
    assert_eq!(snap.items[0].status, DocumentStatus::Idle);
    assert_eq!(snap.active, Some(ids[1].clone()));
    assert_eq!(previews.released.lock().unwrap().get("blob:a.png"), Some(&1));
}

#[tokio::test]
async fn edited_values_flow_into_export() {
    let (store, _) = session(vec![file("a.png", b"a")]);
    let id = store.snapshot().items[0].id.clone();
    Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("a", Some(WIDGET_REPLY))])),
        ExtractionConfig::default(),
    )
    .analyze(&id)
    .await
    .unwrap();

    store
        .edit(
            &id,
            InvoiceEdit::Item {
                index: 0,
                edit: LineItemEdit::Description("Widget \"XL\"".into()),
            },
        )
        .unwrap();
    store.edit(&id, InvoiceEdit::PoNumber("PO \"77\"".into())).unwrap();

    let export = build_export(&store.snapshot(), today()).unwrap().unwrap();
    let text = String::from_utf8(export.bytes[3..].to_vec()).unwrap();
    assert!(text.contains("\"Widget 'XL' (Qty: 2, Unit: 500, Total: 1000)\""), "{text}");
    assert!(text.contains("\"PO \"\"77\"\"\""), "{text}");
}

#[tokio::test]
async fn nothing_succeeded_means_no_export() {
    let (store, _) = session(vec![file("a.png", b"a")]);
    let orch = Orchestrator::new(
        store.clone(),
        Arc::new(FakeModel::new(&[("a", None)])),
        ExtractionConfig::default(),
    );
    orch.analyze_pending().await;
    assert_eq!(build_export(&store.snapshot(), today()).unwrap(), None);
}
