use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Money, Trip};

pub struct TripRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: String,
    name: String,
    destination: String,
    currency: String,
    start_date: String,
    end_date: Option<String>,
    members: String,
    daily_budget: Option<i64>,
    budget_enabled_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TripRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a trip by id. The cache is always written
    /// whole-record, so optimistic writes and reconciler refreshes go
    /// through the same statement.
    pub async fn upsert(&self, trip: &Trip) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO trips (id, name, destination, currency, start_date, end_date,
                               members, daily_budget, budget_enabled_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                destination = excluded.destination,
                currency = excluded.currency,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                members = excluded.members,
                daily_budget = excluded.daily_budget,
                budget_enabled_at = excluded.budget_enabled_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(trip.id.to_string())
        .bind(&trip.name)
        .bind(&trip.destination)
        .bind(&trip.currency)
        .bind(trip.start_date.to_string())
        .bind(trip.end_date.map(|d| d.to_string()))
        .bind(serde_json::to_string(&trip.members).unwrap_or_else(|_| "[]".to_string()))
        .bind(trip.daily_budget.as_ref().map(Money::amount))
        .bind(trip.budget_enabled_at.map(|t| t.to_rfc3339()))
        .bind(trip.created_at.to_rfc3339())
        .bind(trip.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_many(&self, trips: &[Trip]) -> Result<(), sqlx::Error> {
        for trip in trips {
            self.upsert(trip).await?;
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Trip>, sqlx::Error> {
        let row: Option<TripRow> = sqlx::query_as("SELECT * FROM trips WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_trip))
    }

    pub async fn list(&self) -> Result<Vec<Trip>, sqlx::Error> {
        let rows: Vec<TripRow> = sqlx::query_as("SELECT * FROM trips ORDER BY start_date DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(hydrate_trip).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM trips WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn hydrate_trip(row: TripRow) -> Trip {
    let members: Vec<String> = serde_json::from_str(&row.members).unwrap_or_default();
    let daily_budget = row
        .daily_budget
        .map(|amount| Money::new(amount, row.currency.clone()));

    Trip {
        id: Uuid::parse_str(&row.id).unwrap(),
        name: row.name,
        destination: row.destination,
        currency: row.currency,
        start_date: NaiveDate::parse_from_str(&row.start_date, "%Y-%m-%d").unwrap(),
        end_date: row
            .end_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        members,
        daily_budget,
        budget_enabled_at: row
            .budget_enabled_at
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}
