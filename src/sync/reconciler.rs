//! Realtime reconciler: applies change-feed notifications to the local
//! cache.
//!
//! Feed payloads are never trusted as complete. Every insert/update
//! notification triggers a re-fetch of the canonical row by id, and the
//! result is upserted into LocalStore without disturbing unrelated
//! entities. This path runs independently of the mutation queue.

use tokio::sync::mpsc;

use super::feed::ChangeEvent;
use super::remote::{RemoteBackend, RemoteError};
use super::store::{LocalStore, StoreError};

#[derive(Debug)]
pub enum ReconcileError {
    Remote(RemoteError),
    Store(StoreError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Remote(e) => write!(f, "{}", e),
            ReconcileError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<RemoteError> for ReconcileError {
    fn from(e: RemoteError) -> Self {
        ReconcileError::Remote(e)
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        ReconcileError::Store(e)
    }
}

/// Keeps LocalStore current from a stream of change events.
pub struct Reconciler<R: RemoteBackend> {
    store: LocalStore,
    remote: R,
}

impl<R: RemoteBackend> Reconciler<R> {
    pub fn new(store: LocalStore, remote: R) -> Self {
        Self { store, remote }
    }

    /// Applies a single feed event to the cache.
    pub async fn apply(&self, event: &ChangeEvent) -> Result<(), ReconcileError> {
        match event {
            ChangeEvent::Insert { entity, id, .. } | ChangeEvent::Update { entity, id, .. } => {
                match self.remote.fetch(*entity, *id).await? {
                    Some(payload) => {
                        self.store.upsert_payload(*entity, &payload).await?;
                        tracing::debug!(%entity, %id, "cache refreshed from feed");
                    }
                    // The row vanished between the notification and our
                    // fetch; treat it as a delete.
                    None => {
                        self.store.delete(*entity, *id).await?;
                        tracing::debug!(%entity, %id, "row gone upstream, removed from cache");
                    }
                }
            }
            ChangeEvent::Delete { entity, id, .. } => {
                self.store.delete(*entity, *id).await?;
                tracing::debug!(%entity, %id, "removed from cache via feed");
            }
        }
        Ok(())
    }

    /// Drains the event channel until it closes, logging and skipping
    /// per-event failures so one bad row cannot stall the feed.
    pub async fn run(&self, mut events: mpsc::Receiver<ChangeEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.apply(&event).await {
                tracing::warn!(?event, error = %e, "failed to reconcile feed event");
            }
        }
    }
}
