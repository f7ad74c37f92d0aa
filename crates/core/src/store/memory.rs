//! In-process document store.
//!
//! Behaves like a live-query backend from the viewer's point of view: every write bumps
//! a revision counter and each listener re-delivers the complete ordered collection.
//! Like Firestore, documents that lack the ordering field are left out of an ordered
//! query.
//!
//! [`StoreFaults`] lets callers script backend failures (rejected sign-in, a failing
//! write, denied reads, a dropped stream).

use super::{field_at_path, RawDocument, RawSnapshot, Session, SnapshotFeed};
use crate::query::{CollectionQuery, SortDirection};
use crate::store::DocumentStore;
use crate::{AuthError, StoreError};
use async_trait::async_trait;
use ehrview_types::DocumentId;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

const GENERATED_ID_LEN: usize = 20;

/// Scripted failures.
#[derive(Clone, Debug, Default)]
pub struct StoreFaults {
    /// Reject every sign-in with this message.
    pub reject_sign_in: Option<String>,
    /// Fail the n-th call to `add_document` (1-based, counted over the store lifetime).
    pub fail_write_at: Option<usize>,
    /// Answer every listen with a permission error.
    pub deny_reads: bool,
}

/// In-process store. Cheap to clone; clones share data.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    collections: Mutex<HashMap<String, Vec<RawDocument>>>,
    revision: watch::Sender<u64>,
    broken: watch::Sender<Option<String>>,
    faults: Mutex<StoreFaults>,
    write_attempts: AtomicUsize,
    sign_ins: AtomicUsize,
}

impl Default for MemoryInner {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            revision: watch::channel(0).0,
            broken: watch::channel(None).0,
            faults: Mutex::new(StoreFaults::default()),
            write_attempts: AtomicUsize::new(0),
            sign_ins: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: StoreFaults) -> Self {
        let store = Self::new();
        store.set_faults(faults);
        store
    }

    pub fn set_faults(&self, faults: StoreFaults) {
        *self
            .inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = faults;
    }

    /// Insert a document under a caller-chosen id, notifying listeners.
    pub fn insert_with_id(&self, collection: &str, id: DocumentId, document: Value) {
        self.inner.push(collection, RawDocument { id, data: document });
    }

    /// Remove a document, notifying listeners. Returns whether it existed.
    pub fn remove(&self, collection: &str, id: &DocumentId) -> bool {
        let removed = {
            let mut collections = self.inner.lock_collections();
            match collections.get_mut(collection) {
                Some(docs) => {
                    let before = docs.len();
                    docs.retain(|doc| &doc.id != id);
                    docs.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.inner.revision.send_modify(|rev| *rev += 1);
        }
        removed
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock_collections()
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// How many times `sign_in_anonymously` was called.
    pub fn sign_in_count(&self) -> usize {
        self.inner.sign_ins.load(AtomicOrdering::SeqCst)
    }

    /// How many times `add_document` was called, failed calls included.
    pub fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(AtomicOrdering::SeqCst)
    }

    /// Terminate every open listener with a network error.
    pub fn break_listeners(&self, message: impl Into<String>) {
        self.inner.broken.send_replace(Some(message.into()));
    }

    fn faults(&self) -> StoreFaults {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MemoryInner {
    fn lock_collections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<RawDocument>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, collection: &str, document: RawDocument) {
        self.lock_collections()
            .entry(collection.to_owned())
            .or_default()
            .push(document);
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn snapshot(&self, query: &CollectionQuery) -> RawSnapshot {
        let collections = self.lock_collections();
        let Some(docs) = collections.get(&query.collection) else {
            return Vec::new();
        };

        let mut keyed: Vec<(&Value, &RawDocument)> = docs
            .iter()
            .filter_map(|doc| field_at_path(&doc.data, &query.order_by).map(|key| (key, doc)))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| match query.direction {
            SortDirection::Asc => compare_values(a, b),
            SortDirection::Desc => compare_values(b, a),
        });
        keyed.into_iter().map(|(_, doc)| doc.clone()).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
        self.inner.sign_ins.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(message) = self.faults().reject_sign_in {
            return Err(AuthError::Rejected(message));
        }
        Ok(Session::new(format!("anon-{}", generate_id()), None))
    }

    async fn add_document(
        &self,
        _session: &Session,
        collection: &str,
        document: Value,
    ) -> Result<DocumentId, StoreError> {
        let attempt = self.inner.write_attempts.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        if !document.is_object() {
            return Err(StoreError::NotAnObject);
        }
        if self.faults().fail_write_at == Some(attempt) {
            return Err(StoreError::Rejected {
                status: 503,
                message: format!("write {attempt} rejected"),
            });
        }

        let id = DocumentId::new(generate_id())?;
        self.inner.push(
            collection,
            RawDocument {
                id: id.clone(),
                data: document,
            },
        );
        Ok(id)
    }

    fn listen(&self, _session: &Session, query: &CollectionQuery) -> SnapshotFeed {
        let (sink, feed) = SnapshotFeed::channel();
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        let deny_reads = self.faults().deny_reads;

        tokio::spawn(async move {
            if deny_reads {
                sink.deliver(Err(StoreError::PermissionDenied(format!(
                    "read access to {} denied",
                    query.collection
                ))))
                .await;
                return;
            }

            let mut revision = inner.revision.subscribe();
            let mut broken = inner.broken.subscribe();
            loop {
                revision.borrow_and_update();
                let snapshot = inner.snapshot(&query);
                tracing::debug!(
                    collection = %query.collection,
                    documents = snapshot.len(),
                    "memory store delivering snapshot"
                );
                if !sink.deliver(Ok(snapshot)).await {
                    break;
                }

                tokio::select! {
                    _ = sink.cancelled() => break,
                    changed = revision.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    // Copy the reason out so no watch guard lives across the delivery.
                    reason = async {
                        broken.wait_for(Option::is_some).await.map(|r| r.clone())
                    } => {
                        let message = reason.ok().flatten().unwrap_or_default();
                        sink.deliver(Err(StoreError::Transport(message))).await;
                        break;
                    }
                }
            }
        });

        feed
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_ID_LEN)
        .map(char::from)
        .collect()
}

/// Cross-type ordering: null < bool < number < string < array < object.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
