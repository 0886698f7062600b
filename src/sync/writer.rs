//! Optimistic write path: the single entry point for local mutations.
//!
//! Every write validates first, then lands in LocalStore, then is
//! enqueued for background dispatch — the UI and the cache reflect the
//! intent immediately, regardless of network state. Updates capture the
//! pre-mutation cache state as the merge base.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::mutation::{EntityKind, Operation};
use super::queue::{MutationQueue, QueueError};
use super::remote::RemoteBackend;
use super::store::{LocalStore, StoreError};
use crate::models::{Expense, SplitError, Trip};

#[derive(Debug)]
pub enum WriteError {
    Split(SplitError),
    Store(StoreError),
    Queue(QueueError),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Split(e) => write!(f, "{}", e),
            WriteError::Store(e) => write!(f, "{}", e),
            WriteError::Queue(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WriteError {}

impl From<SplitError> for WriteError {
    fn from(e: SplitError) -> Self {
        WriteError::Split(e)
    }
}

impl From<StoreError> for WriteError {
    fn from(e: StoreError) -> Self {
        WriteError::Store(e)
    }
}

impl From<QueueError> for WriteError {
    fn from(e: QueueError) -> Self {
        WriteError::Queue(e)
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(e: serde_json::Error) -> Self {
        WriteError::Store(StoreError::Decode(e))
    }
}

impl From<sqlx::Error> for WriteError {
    fn from(e: sqlx::Error) -> Self {
        WriteError::Store(StoreError::Database(e))
    }
}

/// Applies mutations optimistically and records them for dispatch.
pub struct OptimisticWriter<'a, R: RemoteBackend> {
    store: &'a LocalStore,
    queue: &'a MutationQueue<R>,
}

impl<'a, R: RemoteBackend> OptimisticWriter<'a, R> {
    pub fn new(store: &'a LocalStore, queue: &'a MutationQueue<R>) -> Self {
        Self { store, queue }
    }

    pub async fn create_trip(&self, trip: &Trip) -> Result<(), WriteError> {
        let mut trip = trip.clone();
        trip.updated_at = Utc::now();

        self.store.trips().upsert(&trip).await?;
        let payload = serde_json::to_value(&trip)?;
        self.queue
            .enqueue(EntityKind::Trips, trip.id, Operation::Insert, payload, None)
            .await?;
        Ok(())
    }

    pub async fn update_trip(&self, trip: &Trip) -> Result<(), WriteError> {
        let base = self.store.get_payload(EntityKind::Trips, trip.id).await?;

        let mut trip = trip.clone();
        trip.updated_at = Utc::now();

        self.store.trips().upsert(&trip).await?;
        let payload = serde_json::to_value(&trip)?;
        self.queue
            .enqueue(EntityKind::Trips, trip.id, Operation::Update, payload, base)
            .await?;
        Ok(())
    }

    pub async fn delete_trip(&self, id: Uuid) -> Result<(), WriteError> {
        self.store.trips().delete(id).await?;
        self.queue
            .enqueue(
                EntityKind::Trips,
                id,
                Operation::Delete,
                json!({ "id": id }),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn create_expense(&self, expense: &Expense) -> Result<(), WriteError> {
        expense.validate_split()?;

        let mut expense = expense.clone();
        expense.updated_at = Utc::now();

        self.store.expenses().upsert(&expense).await?;
        let payload = serde_json::to_value(&expense)?;
        self.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload,
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn update_expense(&self, expense: &Expense) -> Result<(), WriteError> {
        expense.validate_split()?;

        let base = self
            .store
            .get_payload(EntityKind::Expenses, expense.id)
            .await?;

        let mut expense = expense.clone();
        expense.updated_at = Utc::now();

        self.store.expenses().upsert(&expense).await?;
        let payload = serde_json::to_value(&expense)?;
        self.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                payload,
                base,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_expense(&self, id: Uuid) -> Result<(), WriteError> {
        self.store.expenses().delete(id).await?;
        self.queue
            .enqueue(
                EntityKind::Expenses,
                id,
                Operation::Delete,
                json!({ "id": id }),
                None,
            )
            .await?;
        Ok(())
    }
}
