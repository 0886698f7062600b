use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::sync::{EntityKind, MutationRecord, MutationStatus, Operation};

/// Durable mutation log, keyed by insertion order.
///
/// The dispatcher is the only component that transitions records out of
/// the log; nothing here ever discards a record silently.
pub struct MutationLogRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MutationRow {
    seq: i64,
    entity: String,
    entity_id: String,
    op: String,
    payload: String,
    base_payload: Option<String>,
    status: String,
    retry_count: i64,
    enqueued_at: String,
}

impl MutationLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a pending record and returns its log position.
    pub async fn append(
        &self,
        entity: EntityKind,
        entity_id: Uuid,
        op: Operation,
        payload: &Value,
        base_payload: Option<&Value>,
        enqueued_at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO mutation_log (entity, entity_id, op, payload, base_payload, status, retry_count, enqueued_at)
            VALUES (?, ?, ?, ?, ?, 'pending', 0, ?)
            "#,
        )
        .bind(entity.to_string())
        .bind(entity_id.to_string())
        .bind(op.to_string())
        .bind(payload.to_string())
        .bind(base_payload.map(|p| p.to_string()))
        .bind(enqueued_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Records eligible for dispatch (pending or failed), oldest first.
    pub async fn list_dispatchable(&self) -> Result<Vec<MutationRecord>, sqlx::Error> {
        let rows: Vec<MutationRow> = sqlx::query_as(
            "SELECT * FROM mutation_log WHERE status IN ('pending', 'failed') ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate_record).collect())
    }

    pub async fn list_by_status(
        &self,
        status: MutationStatus,
    ) -> Result<Vec<MutationRecord>, sqlx::Error> {
        let rows: Vec<MutationRow> =
            sqlx::query_as("SELECT * FROM mutation_log WHERE status = ? ORDER BY seq")
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(hydrate_record).collect())
    }

    pub async fn get(&self, seq: i64) -> Result<Option<MutationRecord>, sqlx::Error> {
        let row: Option<MutationRow> = sqlx::query_as("SELECT * FROM mutation_log WHERE seq = ?")
            .bind(seq)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_record))
    }

    pub async fn set_status(&self, seq: i64, status: MutationStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE mutation_log SET status = ? WHERE seq = ?")
            .bind(status.to_string())
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns in-flight records from an interrupted drain to the retry
    /// pool. A record can only be left `syncing` by a crash mid-drain.
    pub async fn reset_in_flight(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE mutation_log SET status = 'failed' WHERE status = 'syncing'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Marks a record failed and bumps its retry count in one statement.
    pub async fn mark_failed(&self, seq: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE mutation_log SET status = 'failed', retry_count = retry_count + 1 WHERE seq = ?",
        )
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-stamps a conflicted record for resubmission as pending.
    ///
    /// The base snapshot is cleared: a kept-local payload must win over
    /// whatever the remote holds, so the re-dispatch pushes it without
    /// another merge against the stale base.
    pub async fn resubmit(
        &self,
        seq: i64,
        payload: &Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE mutation_log SET payload = ?, base_payload = NULL, status = 'pending', enqueued_at = ? WHERE seq = ?",
        )
        .bind(payload.to_string())
        .bind(enqueued_at.to_rfc3339())
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, seq: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM mutation_log WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count of records per status, for the sync status surface.
    pub async fn status_counts(&self) -> Result<Vec<(MutationStatus, i64)>, sqlx::Error> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM mutation_log GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| status.parse().ok().map(|s| (s, count)))
            .collect())
    }
}

fn hydrate_record(row: MutationRow) -> MutationRecord {
    MutationRecord {
        seq: row.seq,
        entity: row.entity.parse().unwrap(),
        entity_id: Uuid::parse_str(&row.entity_id).unwrap(),
        op: row.op.parse().unwrap(),
        payload: serde_json::from_str(&row.payload).unwrap_or(Value::Null),
        base_payload: row
            .base_payload
            .and_then(|p| serde_json::from_str(&p).ok()),
        status: row.status.parse().unwrap_or(MutationStatus::Pending),
        retry_count: row.retry_count,
        enqueued_at: DateTime::parse_from_rfc3339(&row.enqueued_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        repo: MutationLogRepository,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        TestContext {
            repo: MutationLogRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_append_and_list_in_order() {
        let ctx = setup().await;
        let id = Uuid::new_v4();
        let first = ctx
            .repo
            .append(
                EntityKind::Expenses,
                id,
                Operation::Insert,
                &json!({"title": "a"}),
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        let second = ctx
            .repo
            .append(
                EntityKind::Expenses,
                id,
                Operation::Update,
                &json!({"title": "b"}),
                Some(&json!({"title": "a"})),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(second > first);

        let records = ctx.repo.list_dispatchable().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, first);
        assert_eq!(records[0].op, Operation::Insert);
        assert_eq!(records[0].status, MutationStatus::Pending);
        assert!(records[0].base_payload.is_none());
        assert_eq!(
            records[1].base_payload.as_ref().unwrap()["title"],
            json!("a")
        );
    }

    #[tokio::test]
    async fn test_failed_records_stay_dispatchable() {
        let ctx = setup().await;
        let seq = ctx
            .repo
            .append(
                EntityKind::Trips,
                Uuid::new_v4(),
                Operation::Insert,
                &json!({}),
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        ctx.repo.mark_failed(seq).await.unwrap();
        ctx.repo.mark_failed(seq).await.unwrap();

        let records = ctx.repo.list_dispatchable().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, MutationStatus::Failed);
        assert_eq!(records[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_conflict_records_left_out_of_dispatch() {
        let ctx = setup().await;
        let seq = ctx
            .repo
            .append(
                EntityKind::Trips,
                Uuid::new_v4(),
                Operation::Update,
                &json!({}),
                Some(&json!({})),
                Utc::now(),
            )
            .await
            .unwrap();
        ctx.repo
            .set_status(seq, MutationStatus::Conflict)
            .await
            .unwrap();

        assert!(ctx.repo.list_dispatchable().await.unwrap().is_empty());
        let conflicts = ctx
            .repo
            .list_by_status(MutationStatus::Conflict)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].seq, seq);
    }

    #[tokio::test]
    async fn test_resubmit_restamps_payload() {
        let ctx = setup().await;
        let seq = ctx
            .repo
            .append(
                EntityKind::Expenses,
                Uuid::new_v4(),
                Operation::Update,
                &json!({"title": "old"}),
                Some(&json!({})),
                Utc::now(),
            )
            .await
            .unwrap();
        ctx.repo
            .set_status(seq, MutationStatus::Conflict)
            .await
            .unwrap();

        let restamped = Utc::now();
        ctx.repo
            .resubmit(seq, &json!({"title": "new"}), restamped)
            .await
            .unwrap();

        let record = ctx.repo.get(seq).await.unwrap().unwrap();
        assert_eq!(record.status, MutationStatus::Pending);
        assert_eq!(record.payload["title"], json!("new"));
        assert!(record.base_payload.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_counts() {
        let ctx = setup().await;
        let seq = ctx
            .repo
            .append(
                EntityKind::Expenses,
                Uuid::new_v4(),
                Operation::Insert,
                &json!({}),
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        ctx.repo
            .append(
                EntityKind::Expenses,
                Uuid::new_v4(),
                Operation::Insert,
                &json!({}),
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        let counts = ctx.repo.status_counts().await.unwrap();
        assert_eq!(counts, vec![(MutationStatus::Pending, 2)]);

        ctx.repo.delete(seq).await.unwrap();
        assert!(ctx.repo.get(seq).await.unwrap().is_none());
        assert_eq!(ctx.repo.list_dispatchable().await.unwrap().len(), 1);
    }
}
