//! Live query subscription.
//!
//! [`subscribe`] opens a listener on the store and yields decoded, fully materialised
//! snapshots in the order the backend delivered them. Each item replaces the previous
//! one; nothing is merged.
//!
//! The stream is lazy, unbounded and not restartable. It ends after:
//! - [`Subscription::cancel`] (or dropping the subscription), or
//! - one terminal [`SubscriptionError`]. There is no automatic reconnect.

use crate::backend::Connection;
use crate::query::CollectionQuery;
use crate::store::{CancelHandle, RawSnapshot, Session, SnapshotFeed};
use crate::SubscriptionError;
use fhir::{Resource, ResourceRecord};

/// An open live query.
#[derive(Debug)]
pub struct Subscription {
    feed: SnapshotFeed,
    finished: bool,
}

/// Open a live query on `connection`.
///
/// Requires an established `session` (see [`Connection::ensure_session`]).
pub fn subscribe(
    connection: &Connection,
    session: &Session,
    query: &CollectionQuery,
) -> Subscription {
    tracing::debug!(
        collection = %query.collection,
        order_by = %query.order_by,
        "opening live query"
    );
    Subscription {
        feed: connection.store().listen(session, query),
        finished: false,
    }
}

impl Subscription {
    /// Wait for the next snapshot.
    ///
    /// Returns `None` once cancelled or finished. After a `Some(Err(_))` every further
    /// call returns `None`.
    pub async fn next(&mut self) -> Option<Result<Vec<ResourceRecord>, SubscriptionError>> {
        if self.finished {
            return None;
        }
        let cancelled = self.feed.cancel_handle();

        match self.feed.recv().await {
            Some(Ok(raw)) => Some(Ok(decode_snapshot(raw))),
            Some(Err(err)) => {
                self.finished = true;
                tracing::error!("live query terminated: {err}");
                Some(Err(SubscriptionError::Backend(err)))
            }
            None if cancelled.is_cancelled() => {
                self.finished = true;
                None
            }
            None => {
                self.finished = true;
                tracing::error!("live query closed without an error");
                Some(Err(SubscriptionError::Closed))
            }
        }
    }

    /// Detach from the backend. Safe to call repeatedly and before any snapshot.
    pub fn cancel(&self) {
        self.feed.cancel_handle().cancel();
    }

    /// A handle that can cancel this subscription from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.feed.cancel_handle()
    }

    pub fn is_cancelled(&self) -> bool {
        self.feed.cancel_handle().is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Decode every document, skipping (and logging) the ones that do not fit the schema.
fn decode_snapshot(raw: RawSnapshot) -> Vec<ResourceRecord> {
    raw.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match Resource::parse_value(doc.id, doc.data) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("skipping document {id}: {err}");
                    None
                }
            }
        })
        .collect()
}
