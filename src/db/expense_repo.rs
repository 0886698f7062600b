use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Expense, Money};

pub struct ExpenseRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: String,
    trip_id: String,
    title: String,
    amount: i64,
    currency: String,
    paid_by: String,
    split_with: String,
    split_details: Option<String>,
    is_private: bool,
    is_daily_expense: bool,
    spent_on: String,
    created_at: String,
    updated_at: String,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, expense: &Expense) -> Result<(), sqlx::Error> {
        let split_details = expense
            .split_details
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap_or_else(|_| "{}".to_string()));

        sqlx::query(
            r#"
            INSERT INTO expenses (id, trip_id, title, amount, currency, paid_by, split_with,
                                  split_details, is_private, is_daily_expense, spent_on,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                trip_id = excluded.trip_id,
                title = excluded.title,
                amount = excluded.amount,
                currency = excluded.currency,
                paid_by = excluded.paid_by,
                split_with = excluded.split_with,
                split_details = excluded.split_details,
                is_private = excluded.is_private,
                is_daily_expense = excluded.is_daily_expense,
                spent_on = excluded.spent_on,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.trip_id.to_string())
        .bind(&expense.title)
        .bind(expense.cost.amount())
        .bind(expense.cost.currency())
        .bind(&expense.paid_by)
        .bind(serde_json::to_string(&expense.split_with).unwrap_or_else(|_| "[]".to_string()))
        .bind(split_details)
        .bind(expense.is_private)
        .bind(expense.is_daily_expense)
        .bind(expense.spent_on.to_string())
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_many(&self, expenses: &[Expense]) -> Result<(), sqlx::Error> {
        for expense in expenses {
            self.upsert(expense).await?;
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Expense>, sqlx::Error> {
        let row: Option<ExpenseRow> = sqlx::query_as("SELECT * FROM expenses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_expense))
    }

    /// All expenses for one trip, oldest day first.
    pub async fn get_by_trip(&self, trip_id: Uuid) -> Result<Vec<Expense>, sqlx::Error> {
        let rows: Vec<ExpenseRow> =
            sqlx::query_as("SELECT * FROM expenses WHERE trip_id = ? ORDER BY spent_on, created_at")
                .bind(trip_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(hydrate_expense).collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn hydrate_expense(row: ExpenseRow) -> Expense {
    let split_with: Vec<String> = serde_json::from_str(&row.split_with).unwrap_or_default();
    let split_details: Option<BTreeMap<String, Money>> = row
        .split_details
        .and_then(|d| serde_json::from_str(&d).ok());

    Expense {
        id: Uuid::parse_str(&row.id).unwrap(),
        trip_id: Uuid::parse_str(&row.trip_id).unwrap(),
        title: row.title,
        cost: Money::new(row.amount, row.currency),
        paid_by: row.paid_by,
        split_with,
        split_details,
        is_private: row.is_private,
        is_daily_expense: row.is_daily_expense,
        spent_on: NaiveDate::parse_from_str(&row.spent_on, "%Y-%m-%d").unwrap(),
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}
