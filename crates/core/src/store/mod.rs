//! Document store seam.
//!
//! The rest of the crate talks to the backend only through [`DocumentStore`]. Two
//! implementations ship with the crate:
//! - [`memory::MemoryStore`]: in-process, pushes on every write
//! - [`firestore::FirestoreRestStore`]: Firestore and Identity Toolkit over REST
//!
//! A listener delivers *full* ordered snapshots, never deltas. Stores push them into a
//! [`SnapshotSink`]; the subscriber reads them from the paired [`SnapshotFeed`].

pub mod firestore;
mod firestore_value;
pub mod memory;

use crate::constants::{SNAPSHOT_CHANNEL_CAPACITY, TOKEN_REFRESH_MARGIN};
use crate::query::CollectionQuery;
use crate::{AuthError, StoreError};
use async_trait::async_trait;
use ehrview_types::DocumentId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

pub use firestore::FirestoreRestStore;
pub use memory::{MemoryStore, StoreFaults};

/// Bearer credentials issued by the auth backend.
#[derive(Clone, PartialEq, Eq)]
pub struct IdToken {
    value: String,
    refresh_token: String,
    expires_at: Instant,
}

impl IdToken {
    /// A token that expires `lifetime` from now.
    pub fn new(
        value: impl Into<String>,
        refresh_token: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        Self::expiring_at(value, refresh_token, Instant::now() + lifetime)
    }

    pub fn expiring_at(
        value: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Instant,
    ) -> Self {
        Self {
            value: value.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Whether the token is expired or within [`TOKEN_REFRESH_MARGIN`] of expiring at `now`.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN >= self.expires_at
    }
}

/// An established backend identity.
///
/// Clones share one credential slot, so a refresh made through any clone is seen by
/// every listener and writer holding the session.
#[derive(Clone)]
pub struct Session {
    uid: String,
    token: Option<Arc<tokio::sync::Mutex<IdToken>>>,
}

impl Session {
    pub fn new(uid: impl Into<String>, token: Option<IdToken>) -> Self {
        Self {
            uid: uid.into(),
            token: token.map(|token| Arc::new(tokio::sync::Mutex::new(token))),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub(crate) fn token_slot(&self) -> Option<&tokio::sync::Mutex<IdToken>> {
        self.token.as_deref()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        let same_slot = match (&self.token, &other.token) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.uid == other.uid && same_slot
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("id_token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One stored document as returned by a store, before decoding.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDocument {
    pub id: DocumentId,
    pub data: serde_json::Value,
}

/// The complete ordered result set at one point in time.
pub type RawSnapshot = Vec<RawDocument>;

/// Shared cancellation flag for one listener.
///
/// Cancelling is idempotent and may happen before anything was delivered.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Producer half of a listener channel, owned by the store's listener task.
#[derive(Debug)]
pub struct SnapshotSink {
    sender: mpsc::Sender<Result<RawSnapshot, StoreError>>,
    cancel: CancelHandle,
}

impl SnapshotSink {
    /// Push one snapshot or a terminal error.
    ///
    /// Returns `false` once the subscriber cancelled or went away; the listener task
    /// should stop then.
    pub async fn deliver(&self, item: Result<RawSnapshot, StoreError>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.sender.send(item) => sent.is_ok(),
        }
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer half of a listener channel.
#[derive(Debug)]
pub struct SnapshotFeed {
    receiver: mpsc::Receiver<Result<RawSnapshot, StoreError>>,
    cancel: CancelHandle,
}

impl SnapshotFeed {
    /// Create a connected sink/feed pair sharing one cancellation flag.
    pub fn channel() -> (SnapshotSink, SnapshotFeed) {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let cancel = CancelHandle::new();
        (
            SnapshotSink {
                sender,
                cancel: cancel.clone(),
            },
            SnapshotFeed { receiver, cancel },
        )
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Next item, or `None` when cancelled or when the producer stopped.
    pub async fn recv(&mut self) -> Option<Result<RawSnapshot, StoreError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = self.receiver.recv() => item,
        }
    }
}

/// Backend operations needed by the viewer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Establish a fresh anonymous identity.
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError>;

    /// Insert `document` into `collection` and return the id the backend assigned.
    async fn add_document(
        &self,
        session: &Session,
        collection: &str,
        document: serde_json::Value,
    ) -> Result<DocumentId, StoreError>;

    /// Start a live query. The store spawns its own listener task.
    fn listen(&self, session: &Session, query: &CollectionQuery) -> SnapshotFeed;

    /// Short name for logs.
    fn describe(&self) -> &'static str;
}

/// Resolve a dotted field path inside a JSON document.
pub(crate) fn field_at_path<'a>(
    document: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_at_path_walks_nested_maps() {
        let doc = json!({ "metadata": { "fetchTime": "2025-01-01T00:00:00Z" } });
        assert_eq!(
            field_at_path(&doc, "metadata.fetchTime"),
            Some(&json!("2025-01-01T00:00:00Z"))
        );
        assert_eq!(field_at_path(&doc, "metadata.createdTime"), None);
    }

    #[test]
    fn session_debug_redacts_token() {
        let token = IdToken::new("secret-token", "secret-refresh", Duration::from_secs(3600));
        let session = Session::new("uid-1", Some(token));
        let debug = format!("{session:?}");
        assert!(debug.contains("uid-1"));
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn token_needs_refresh_inside_margin() {
        let now = Instant::now();
        let fresh = IdToken::expiring_at("t", "r", now + Duration::from_secs(3600));
        assert!(!fresh.needs_refresh(now));
        assert!(fresh.needs_refresh(now + Duration::from_secs(3600) - TOKEN_REFRESH_MARGIN));

        let expired = IdToken::expiring_at("t", "r", now);
        assert!(expired.needs_refresh(now));
    }

    #[tokio::test]
    async fn session_clones_share_refreshed_token() {
        let now = Instant::now();
        let session = Session::new("uid-1", Some(IdToken::expiring_at("old", "r", now)));
        let clone = session.clone();
        assert_eq!(session, clone);

        *session.token_slot().expect("token").lock().await =
            IdToken::expiring_at("new", "r2", now + Duration::from_secs(3600));
        let seen = clone.token_slot().expect("token").lock().await.clone();
        assert_eq!(seen.value(), "new");
        assert_eq!(seen.refresh_token(), "r2");
    }

    #[tokio::test]
    async fn cancel_before_delivery_stops_feed() {
        let (sink, mut feed) = SnapshotFeed::channel();
        let handle = feed.cancel_handle();
        handle.cancel();
        handle.cancel();

        assert!(!sink.deliver(Ok(Vec::new())).await);
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn delivered_items_arrive_in_order() {
        let (sink, mut feed) = SnapshotFeed::channel();
        let id = DocumentId::new("a").expect("id");
        assert!(
            sink.deliver(Ok(vec![RawDocument {
                id: id.clone(),
                data: json!({})
            }]))
            .await
        );
        assert!(sink.deliver(Ok(Vec::new())).await);

        let first = feed.recv().await.expect("first").expect("ok");
        assert_eq!(first.len(), 1);
        let second = feed.recv().await.expect("second").expect("ok");
        assert!(second.is_empty());
    }
}
