//! Session store: the ordered list of uploaded documents and the active
//! selection.
//!
//! The store is an explicitly owned state container. Every mutation builds a
//! new [`SessionSnapshot`] and publishes it in one step through a
//! `tokio::sync::watch` channel, so observers only ever see whole states,
//! never a half-applied change. Mutations are serialised by the channel's
//! internal lock; the store is `Send + Sync` and can be shared behind an
//! `Arc`.
//!
//! ## Document lifecycle
//!
//! ```text
//! IDLE ──▶ ANALYZING ──▶ SUCCESS
//!             ▲   │
//!             │   ▼
//!             └─ ERROR
//! ```
//!
//! SUCCESS is terminal; only removal takes a document out of it.

pub mod preview;

use crate::error::InvoiceError;
use crate::model::{InvoiceData, InvoiceEdit};
use crate::pipeline::input::SourceFile;
use preview::{PreviewProvider, PreviewRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Unique, non-empty identifier of a document in the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a document is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Idle,
    Analyzing,
    Success,
    Error,
}

impl DocumentStatus {
    /// Whether analysis may start from this status.
    pub fn can_start_analysis(self) -> bool {
        matches!(self, DocumentStatus::Idle | DocumentStatus::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentStatus::Idle => "IDLE",
            DocumentStatus::Analyzing => "ANALYZING",
            DocumentStatus::Success => "SUCCESS",
            DocumentStatus::Error => "ERROR",
        })
    }
}

/// One uploaded document and what is known about it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionItem {
    pub id: DocumentId,
    pub file: SourceFile,
    pub preview: PreviewRef,
    pub status: DocumentStatus,
    pub data: Option<InvoiceData>,
    pub error: Option<String>,
}

/// A status change applied to one item.
///
/// `Analyzing` is only valid from IDLE or ERROR and is applied through
/// [`SessionStore::begin_analysis`]; the other two only finish an item that
/// is currently ANALYZING.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentUpdate {
    /// Analysis started: prior error cleared, prior data kept.
    Analyzing,
    /// Analysis produced data.
    Succeeded(InvoiceData),
    /// Analysis failed: message set, prior data kept.
    Failed(String),
}

impl SessionItem {
    /// Whether the lifecycle allows `update` from the current status.
    fn accepts(&self, update: &DocumentUpdate) -> bool {
        match update {
            DocumentUpdate::Analyzing => self.status.can_start_analysis(),
            DocumentUpdate::Succeeded(_) | DocumentUpdate::Failed(_) => {
                self.status == DocumentStatus::Analyzing
            }
        }
    }

    fn apply(&mut self, update: DocumentUpdate) {
        match update {
            DocumentUpdate::Analyzing => {
                self.status = DocumentStatus::Analyzing;
                self.error = None;
            }
            DocumentUpdate::Succeeded(data) => {
                self.status = DocumentStatus::Success;
                self.data = Some(data);
                self.error = None;
            }
            DocumentUpdate::Failed(message) => {
                self.status = DocumentStatus::Error;
                self.error = Some(message);
            }
        }
    }
}

/// An immutable view of the whole session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub items: Vec<SessionItem>,
    pub active: Option<DocumentId>,
}

impl SessionSnapshot {
    pub fn get(&self, id: &DocumentId) -> Option<&SessionItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn active_item(&self) -> Option<&SessionItem> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    /// Ids of IDLE and ERROR items, in list order.
    pub fn pending_ids(&self) -> Vec<DocumentId> {
        self.items
            .iter()
            .filter(|item| item.status.can_start_analysis())
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    fn position(&self, id: &DocumentId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

/// Owner of the session state.
pub struct SessionStore {
    state: watch::Sender<Arc<SessionSnapshot>>,
    previews: Arc<dyn PreviewProvider>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .field("previews", &"<dyn PreviewProvider>")
            .finish()
    }
}

impl SessionStore {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        let (state, _) = watch::channel(Arc::new(SessionSnapshot::default()));
        Self { state, previews }
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.state.borrow().clone()
    }

    /// Observe state changes. Each received value is a complete snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.state.subscribe()
    }

    pub fn get(&self, id: &DocumentId) -> Option<SessionItem> {
        self.state.borrow().get(id).cloned()
    }

    pub fn active_item(&self) -> Option<SessionItem> {
        self.state.borrow().active_item().cloned()
    }

    /// Append new IDLE documents and select the first of them.
    ///
    /// The selection moves even when another document was already active.
    pub fn add(&self, files: Vec<SourceFile>) -> Result<Vec<DocumentId>, InvoiceError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut new_items = Vec::with_capacity(files.len());
        for file in files {
            match self.previews.create(&file) {
                Ok(preview) => new_items.push(SessionItem {
                    id: DocumentId::generate(),
                    file,
                    preview,
                    status: DocumentStatus::Idle,
                    data: None,
                    error: None,
                }),
                Err(e) => {
                    for item in &new_items {
                        self.previews.release(&item.preview);
                    }
                    return Err(e);
                }
            }
        }

        let ids: Vec<DocumentId> = new_items.iter().map(|item| item.id.clone()).collect();
        self.state.send_modify(|current| {
            let mut next = SessionSnapshot::clone(current);
            next.active = Some(ids[0].clone());
            next.items.extend(new_items);
            *current = Arc::new(next);
        });
        debug!("Added {} document(s) to the session", ids.len());
        Ok(ids)
    }

    /// Remove a document and release its preview.
    ///
    /// When it was the active document, the first remaining one (or none)
    /// becomes active. Returns `false` when the id is unknown.
    pub fn remove(&self, id: &DocumentId) -> bool {
        let mut removed: Option<SessionItem> = None;
        self.state.send_if_modified(|current| {
            let Some(pos) = current.position(id) else {
                return false;
            };
            let mut next = SessionSnapshot::clone(current);
            removed = Some(next.items.remove(pos));
            if next.active.as_ref() == Some(id) {
                next.active = next.items.first().map(|item| item.id.clone());
            }
            *current = Arc::new(next);
            true
        });

        match removed {
            Some(item) => {
                self.previews.release(&item.preview);
                debug!("Removed document {} ({})", item.id, item.file.name);
                true
            }
            None => false,
        }
    }

    /// Finish an ANALYZING document with its result.
    ///
    /// A no-op returning `false` when the id is unknown (e.g. the document
    /// was removed mid-analysis) or the lifecycle forbids the change: only
    /// ANALYZING items accept a result, and analysis is started with
    /// [`begin_analysis`](Self::begin_analysis).
    pub fn update(&self, id: &DocumentId, update: DocumentUpdate) -> bool {
        if matches!(update, DocumentUpdate::Analyzing) {
            debug!("Ignoring ANALYZING update for {}; use begin_analysis", id);
            return false;
        }
        self.state.send_if_modified(|current| {
            let Some(pos) = current.position(id) else {
                return false;
            };
            if !current.items[pos].accepts(&update) {
                debug!(
                    "Rejected update for {} while {}",
                    id, current.items[pos].status
                );
                return false;
            }
            let mut next = SessionSnapshot::clone(current);
            next.items[pos].apply(update);
            *current = Arc::new(next);
            true
        })
    }

    /// Make a document active. No-op returning `false` for unknown ids.
    pub fn select(&self, id: &DocumentId) -> bool {
        let mut found = false;
        self.state.send_if_modified(|current| {
            if current.position(id).is_none() {
                return false;
            }
            found = true;
            if current.active.as_ref() == Some(id) {
                return false;
            }
            let mut next = SessionSnapshot::clone(current);
            next.active = Some(id.clone());
            *current = Arc::new(next);
            true
        });
        found
    }

    /// Atomically check that analysis may start and mark the document
    /// ANALYZING. Returns its source file.
    pub fn begin_analysis(&self, id: &DocumentId) -> Result<SourceFile, InvoiceError> {
        let mut outcome = Err(InvoiceError::DocumentNotFound { id: id.clone() });
        self.state.send_if_modified(|current| {
            let Some(pos) = current.position(id) else {
                return false;
            };
            let status = current.items[pos].status;
            if !current.items[pos].accepts(&DocumentUpdate::Analyzing) {
                outcome = Err(InvoiceError::InvalidTransition {
                    id: id.clone(),
                    status,
                });
                return false;
            }
            let mut next = SessionSnapshot::clone(current);
            next.items[pos].apply(DocumentUpdate::Analyzing);
            outcome = Ok(next.items[pos].file.clone());
            *current = Arc::new(next);
            true
        });
        outcome
    }

    /// Apply a user edit to a document's extracted data.
    pub fn edit(&self, id: &DocumentId, edit: InvoiceEdit) -> Result<(), InvoiceError> {
        let mut outcome = Err(InvoiceError::DocumentNotFound { id: id.clone() });
        self.state.send_if_modified(|current| {
            let Some(pos) = current.position(id) else {
                return false;
            };
            let Some(mut data) = current.items[pos].data.clone() else {
                outcome = Err(InvoiceError::InvalidEdit {
                    id: id.clone(),
                    reason: "document has no extracted data".into(),
                });
                return false;
            };
            if let Err(reason) = data.apply(edit) {
                outcome = Err(InvoiceError::InvalidEdit {
                    id: id.clone(),
                    reason,
                });
                return false;
            }
            let mut next = SessionSnapshot::clone(current);
            next.items[pos].data = Some(data);
            *current = Arc::new(next);
            outcome = Ok(());
            true
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LineItem, LineItemEdit};
    use std::sync::Mutex;

    /// Records every created and released preview.
    #[derive(Default)]
    struct CountingPreviews {
        created: Mutex<Vec<PreviewRef>>,
        released: Mutex<Vec<PreviewRef>>,
    }

    impl PreviewProvider for CountingPreviews {
        fn create(&self, file: &SourceFile) -> Result<PreviewRef, InvoiceError> {
            let mut created = self.created.lock().unwrap();
            let preview = PreviewRef::new(format!("preview://{}/{}", created.len(), file.name));
            created.push(preview.clone());
            Ok(preview)
        }

        fn release(&self, preview: &PreviewRef) {
            self.released.lock().unwrap().push(preview.clone());
        }
    }

    fn store() -> (SessionStore, Arc<CountingPreviews>) {
        let previews = Arc::new(CountingPreviews::default());
        (SessionStore::new(previews.clone()), previews)
    }

    fn files(names: &[&str]) -> Vec<SourceFile> {
        names
            .iter()
            .map(|n| SourceFile::from_bytes(*n, b"bytes".to_vec()))
            .collect()
    }

    fn data() -> InvoiceData {
        InvoiceData {
            invoice_date: "2024-01-01".into(),
            invoice_number: "N1".into(),
            total_amount: 5.0,
            items: vec![LineItem::new("Nut", 5.0, 1.0, 5.0)],
            ..Default::default()
        }
    }

    #[test]
    fn add_creates_idle_items_with_unique_ids() {
        let (store, previews) = store();
        let ids = store.add(files(&["a.png", "b.pdf", "c.jpg"])).unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.items.len(), 3);
        assert!(snap.items.iter().all(|i| i.status == DocumentStatus::Idle));
        assert!(ids.iter().all(|id| !id.as_str().is_empty()));
        let mut unique = ids.clone();
        unique.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert_eq!(previews.created.lock().unwrap().len(), 3);
    }

    #[test]
    fn add_selects_first_new_item_even_with_existing_selection() {
        let (store, _) = store();
        let first = store.add(files(&["a.png"])).unwrap();
        assert_eq!(store.snapshot().active, Some(first[0].clone()));

        let second = store.add(files(&["b.png", "c.png"])).unwrap();
        assert_eq!(store.snapshot().active, Some(second[0].clone()));
    }

    #[test]
    fn add_nothing_is_a_no_op() {
        let (store, _) = store();
        assert!(store.add(Vec::new()).unwrap().is_empty());
        assert_eq!(store.snapshot().active, None);
    }

    #[test]
    fn remove_releases_preview_exactly_once() {
        let (store, previews) = store();
        let ids = store.add(files(&["a.png", "b.png"])).unwrap();
        let preview = store.get(&ids[0]).unwrap().preview;

        assert!(store.remove(&ids[0]));
        assert!(!store.remove(&ids[0]));

        let released = previews.released.lock().unwrap();
        assert_eq!(released.as_slice(), &[preview]);
    }

    #[test]
    fn removing_active_selects_first_remaining() {
        let (store, _) = store();
        let ids = store.add(files(&["a.png", "b.png", "c.png"])).unwrap();
        store.select(&ids[1]);

        store.remove(&ids[1]);
        assert_eq!(store.snapshot().active, Some(ids[0].clone()));

        store.remove(&ids[0]);
        store.remove(&ids[2]);
        assert_eq!(store.snapshot().active, None);
    }

    #[test]
    fn removing_inactive_keeps_selection() {
        let (store, _) = store();
        let ids = store.add(files(&["a.png", "b.png"])).unwrap();
        store.select(&ids[1]);
        store.remove(&ids[0]);
        assert_eq!(store.snapshot().active, Some(ids[1].clone()));
    }

    #[test]
    fn select_unknown_id_is_no_op() {
        let (store, _) = store();
        let ids = store.add(files(&["a.png"])).unwrap();
        assert!(!store.select(&DocumentId::from("nope")));
        assert_eq!(store.snapshot().active, Some(ids[0].clone()));
        assert!(store.select(&ids[0]));
    }

    #[test]
    fn update_unknown_id_is_no_op() {
        let (store, _) = store();
        store.add(files(&["a.png"])).unwrap();
        let before = store.snapshot();
        assert!(!store.update(&DocumentId::from("gone"), DocumentUpdate::Failed("x".into())));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn failure_then_retry_clears_error() {
        let (store, _) = store();
        let id = store.add(files(&["a.png"])).unwrap().remove(0);

        store.begin_analysis(&id).unwrap();
        assert!(store.update(&id, DocumentUpdate::Failed("boom".into())));
        let failed = store.get(&id).unwrap();
        assert_eq!(failed.status, DocumentStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        // An ERROR item may be analysed again.
        store.begin_analysis(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().error, None);
        assert!(store.update(&id, DocumentUpdate::Succeeded(data())));

        let item = store.get(&id).unwrap();
        assert_eq!(item.status, DocumentStatus::Success);
        assert_eq!(item.error, None);
        assert_eq!(item.data, Some(data()));
    }

    #[test]
    fn results_only_land_on_analyzing_items() {
        let (store, _) = store();
        let id = store.add(files(&["a.png"])).unwrap().remove(0);

        // IDLE never started, so it takes no result.
        assert!(!store.update(&id, DocumentUpdate::Succeeded(data())));
        assert!(!store.update(&id, DocumentUpdate::Failed("x".into())));
        assert_eq!(store.get(&id).unwrap().status, DocumentStatus::Idle);

        // Starting goes through begin_analysis only.
        assert!(!store.update(&id, DocumentUpdate::Analyzing));
        assert_eq!(store.get(&id).unwrap().status, DocumentStatus::Idle);

        store.begin_analysis(&id).unwrap();
        assert!(store.update(&id, DocumentUpdate::Succeeded(data())));

        // SUCCESS is left only by removal.
        let before = store.snapshot();
        assert!(!store.update(&id, DocumentUpdate::Failed("late".into())));
        assert!(!store.update(&id, DocumentUpdate::Analyzing));
        assert!(!store.update(&id, DocumentUpdate::Succeeded(InvoiceData::default())));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));

        let item = store.get(&id).unwrap();
        assert_eq!(item.status, DocumentStatus::Success);
        assert_eq!(item.data, Some(data()));
        assert_eq!(item.error, None);
    }

    #[test]
    fn begin_analysis_enforces_lifecycle() {
        let (store, _) = store();
        let id = store.add(files(&["a.png"])).unwrap().remove(0);

        let file = store.begin_analysis(&id).unwrap();
        assert_eq!(file.name, "a.png");
        assert_eq!(store.get(&id).unwrap().status, DocumentStatus::Analyzing);

        let err = store.begin_analysis(&id).unwrap_err();
        assert!(matches!(
            err,
            InvoiceError::InvalidTransition { status: DocumentStatus::Analyzing, .. }
        ));

        assert!(store.update(&id, DocumentUpdate::Succeeded(data())));
        assert!(matches!(
            store.begin_analysis(&id).unwrap_err(),
            InvoiceError::InvalidTransition { status: DocumentStatus::Success, .. }
        ));

        assert!(matches!(
            store.begin_analysis(&DocumentId::from("missing")).unwrap_err(),
            InvoiceError::DocumentNotFound { .. }
        ));
    }

    #[test]
    fn edit_applies_tagged_update() {
        let (store, _) = store();
        let id = store.add(files(&["a.png"])).unwrap().remove(0);

        assert!(matches!(
            store.edit(&id, InvoiceEdit::Currency("EUR".into())),
            Err(InvoiceError::InvalidEdit { .. })
        ));

        store.begin_analysis(&id).unwrap();
        store.update(&id, DocumentUpdate::Succeeded(data()));
        store
            .edit(
                &id,
                InvoiceEdit::Item {
                    index: 0,
                    edit: LineItemEdit::Description("Hex nut".into()),
                },
            )
            .unwrap();
        assert_eq!(store.get(&id).unwrap().data.unwrap().items[0].description, "Hex nut");

        assert!(store
            .edit(&id, InvoiceEdit::RemoveItem(9))
            .is_err());
    }

    #[test]
    fn observers_see_whole_snapshots() {
        let (store, _) = store();
        let mut rx = store.subscribe();
        let ids = store.add(files(&["a.png", "b.png"])).unwrap();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.items.len(), 2);
        assert_eq!(seen.active, Some(ids[0].clone()));

        // No-op operations do not notify.
        store.select(&DocumentId::from("nope"));
        assert!(!rx.has_changed().unwrap());
    }
}
