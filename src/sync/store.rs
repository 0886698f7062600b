//! LocalStore: the client-resident cache shared by the optimistic write
//! path, the dispatcher, and the reconciler.
//!
//! Typed reads go through the repositories; the payload entry points
//! convert between entity models and the JSON form used by the mutation
//! log and the remote backend, so the conversion lives in one place.

use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::mutation::EntityKind;
use crate::db::{ExpenseRepository, TripRepository};
use crate::models::{Expense, Trip};

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Decode(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Cache error: {}", e),
            StoreError::Decode(e) => write!(f, "Cache payload error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e)
    }
}

/// Durable key-addressed cache of trip and expense entities.
pub struct LocalStore {
    trips: TripRepository,
    expenses: ExpenseRepository,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            trips: TripRepository::new(pool.clone()),
            expenses: ExpenseRepository::new(pool),
        }
    }

    pub fn trips(&self) -> &TripRepository {
        &self.trips
    }

    pub fn expenses(&self) -> &ExpenseRepository {
        &self.expenses
    }

    /// Upserts an entity from its JSON payload form.
    pub async fn upsert_payload(
        &self,
        entity: EntityKind,
        payload: &Value,
    ) -> Result<(), StoreError> {
        match entity {
            EntityKind::Trips => {
                let trip: Trip = serde_json::from_value(payload.clone())?;
                self.trips.upsert(&trip).await?;
            }
            EntityKind::Expenses => {
                let expense: Expense = serde_json::from_value(payload.clone())?;
                self.expenses.upsert(&expense).await?;
            }
        }
        Ok(())
    }

    /// Reads an entity back as a JSON payload, for base snapshots.
    pub async fn get_payload(
        &self,
        entity: EntityKind,
        id: Uuid,
    ) -> Result<Option<Value>, StoreError> {
        let payload = match entity {
            EntityKind::Trips => self
                .trips
                .get_by_id(id)
                .await?
                .map(|t| serde_json::to_value(&t))
                .transpose()?,
            EntityKind::Expenses => self
                .expenses
                .get_by_id(id)
                .await?
                .map(|e| serde_json::to_value(&e))
                .transpose()?,
        };
        Ok(payload)
    }

    pub async fn delete(&self, entity: EntityKind, id: Uuid) -> Result<(), StoreError> {
        match entity {
            EntityKind::Trips => self.trips.delete(id).await?,
            EntityKind::Expenses => self.expenses.delete(id).await?,
        }
        Ok(())
    }
}
