//! Durable mutation queue and dispatcher.
//!
//! Local writes are captured as mutation records first and dispatched to
//! the remote backend in the background, oldest first. A record leaves
//! the queue only on confirmed remote success or an explicit
//! accept-remote resolution; failures and conflicts keep it durable.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

use super::merge::{three_way_merge, MergeOutcome};
use super::mutation::{EntityKind, MutationRecord, MutationStatus, Operation};
use super::remote::{RemoteBackend, RemoteError, DEFAULT_REQUEST_TIMEOUT_SECS};
use super::store::{LocalStore, StoreError};
use crate::config::SyncConfig;
use crate::db::MutationLogRepository;

/// Grace window when comparing the remote timestamp to the base
/// snapshot's, absorbing small clock skew between writers.
const CLOCK_SKEW_GRACE_MS: i64 = 1000;

/// Retry behavior for failed records. There is deliberately no backoff:
/// the retry cadence is whatever triggers `process_queue` (connectivity
/// events, timers, post-mutation calls).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Records with this many failed attempts are no longer dispatched;
    /// they stay in the queue and are surfaced, never deleted.
    pub max_attempts: Option<u32>,
    /// Per-request ceiling on any single remote call.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            request_timeout: Duration::from_secs(
                config
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }
}

/// What one `process_queue` run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// False when another drain was already running and this call was a
    /// no-op.
    pub ran: bool,
    pub dispatched: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum QueueError {
    Database(sqlx::Error),
    Store(StoreError),
    Remote(RemoteError),
    NotFound(i64),
    NotConflicted(i64),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Database(e) => write!(f, "Queue storage error: {}", e),
            QueueError::Store(e) => write!(f, "{}", e),
            QueueError::Remote(e) => write!(f, "{}", e),
            QueueError::NotFound(seq) => write!(f, "No queued mutation with seq {}", seq),
            QueueError::NotConflicted(seq) => {
                write!(f, "Queued mutation {} is not in conflict", seq)
            }
        }
    }
}

impl std::error::Error for QueueError {}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Database(e)
    }
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        QueueError::Store(e)
    }
}

enum DispatchOutcome {
    Done,
    Conflict(Vec<String>),
    RemoteFailed(RemoteError),
}

/// The mutation queue: enqueue side plus background dispatcher.
pub struct MutationQueue<R: RemoteBackend> {
    log: MutationLogRepository,
    store: LocalStore,
    remote: R,
    policy: RetryPolicy,
    drain_lock: Mutex<()>,
}

impl<R: RemoteBackend> MutationQueue<R> {
    pub fn new(pool: SqlitePool, remote: R, policy: RetryPolicy) -> Self {
        Self {
            log: MutationLogRepository::new(pool.clone()),
            store: LocalStore::new(pool),
            remote,
            policy,
            drain_lock: Mutex::new(()),
        }
    }

    /// Appends a pending mutation. This is purely local and never waits
    /// on the network; the caller's intent is captured before any
    /// dispatch is attempted.
    pub async fn enqueue(
        &self,
        entity: EntityKind,
        entity_id: Uuid,
        op: Operation,
        payload: Value,
        base_payload: Option<Value>,
    ) -> Result<i64, QueueError> {
        let seq = self
            .log
            .append(
                entity,
                entity_id,
                op,
                &payload,
                base_payload.as_ref(),
                Utc::now(),
            )
            .await?;
        tracing::debug!(seq, %entity, %op, %entity_id, "enqueued mutation");
        Ok(seq)
    }

    /// Drains the queue once, oldest record first.
    ///
    /// Single-flight: if another drain is running this returns
    /// immediately with `ran = false`. Records for an entity whose
    /// earlier record failed or conflicted in this run are skipped so
    /// per-entity enqueue order is preserved.
    pub async fn process_queue(&self) -> Result<DrainReport, QueueError> {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("queue drain already in progress");
                return Ok(DrainReport::default());
            }
        };

        let stale = self.log.reset_in_flight().await?;
        if stale > 0 {
            tracing::warn!(stale, "requeued in-flight records from interrupted drain");
        }

        let mut report = DrainReport {
            ran: true,
            ..Default::default()
        };
        let records = self.log.list_dispatchable().await?;
        let mut blocked: HashSet<(EntityKind, Uuid)> = HashSet::new();

        for record in records {
            let key = (record.entity, record.entity_id);
            if blocked.contains(&key) {
                report.skipped += 1;
                continue;
            }
            if let Some(max) = self.policy.max_attempts {
                if record.retry_count >= i64::from(max) {
                    tracing::warn!(
                        seq = record.seq,
                        retries = record.retry_count,
                        "mutation exceeded retry ceiling; leaving it for manual attention"
                    );
                    report.skipped += 1;
                    continue;
                }
            }

            self.log
                .set_status(record.seq, MutationStatus::Syncing)
                .await?;

            match self.dispatch(&record).await? {
                DispatchOutcome::Done => {
                    self.log.delete(record.seq).await?;
                    report.dispatched += 1;
                    tracing::debug!(seq = record.seq, "mutation confirmed by backend");
                }
                DispatchOutcome::Conflict(fields) => {
                    self.log
                        .set_status(record.seq, MutationStatus::Conflict)
                        .await?;
                    blocked.insert(key);
                    report.conflicts += 1;
                    tracing::warn!(
                        seq = record.seq,
                        entity = %record.entity,
                        fields = fields.join(", "),
                        "merge conflict; awaiting manual resolution"
                    );
                }
                DispatchOutcome::RemoteFailed(e) => {
                    self.log.mark_failed(record.seq).await?;
                    blocked.insert(key);
                    report.failed += 1;
                    if e.is_transient() {
                        tracing::warn!(seq = record.seq, error = %e, "dispatch failed; will retry");
                    } else {
                        tracing::warn!(
                            seq = record.seq,
                            error = %e,
                            "backend rejected mutation; retry will not succeed unchanged"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, record: &MutationRecord) -> Result<DispatchOutcome, QueueError> {
        match record.op {
            Operation::Insert => {
                let result = self
                    .call(self.remote.upsert(record.entity, record.entity_id, &record.payload))
                    .await;
                Ok(match result {
                    Ok(()) => DispatchOutcome::Done,
                    Err(e) => DispatchOutcome::RemoteFailed(e),
                })
            }
            Operation::Delete => {
                let result = self
                    .call(self.remote.delete(record.entity, record.entity_id))
                    .await;
                Ok(match result {
                    Ok(()) => DispatchOutcome::Done,
                    Err(e) => DispatchOutcome::RemoteFailed(e),
                })
            }
            Operation::Update => self.dispatch_update(record).await,
        }
    }

    async fn dispatch_update(&self, record: &MutationRecord) -> Result<DispatchOutcome, QueueError> {
        let current = match self.call(self.remote.fetch(record.entity, record.entity_id)).await {
            Ok(current) => current,
            Err(e) => return Ok(DispatchOutcome::RemoteFailed(e)),
        };

        let (remote, base) = match (current, &record.base_payload) {
            (Some(remote), Some(base)) => (remote, base),
            // No remote row (or no base snapshot): nothing to merge
            // against, push the intended state as an idempotent upsert.
            _ => {
                let result = self
                    .call(self.remote.upsert(record.entity, record.entity_id, &record.payload))
                    .await;
                return Ok(match result {
                    Ok(()) => DispatchOutcome::Done,
                    Err(e) => DispatchOutcome::RemoteFailed(e),
                });
            }
        };

        if !remote_is_newer(&remote, base) {
            let result = self
                .call(self.remote.upsert(record.entity, record.entity_id, &record.payload))
                .await;
            return Ok(match result {
                Ok(()) => DispatchOutcome::Done,
                Err(e) => DispatchOutcome::RemoteFailed(e),
            });
        }

        match three_way_merge(record.entity, base, &record.payload, &remote) {
            MergeOutcome::Merged(mut merged) => {
                if let Some(obj) = merged.as_object_mut() {
                    obj.insert(
                        "updated_at".to_string(),
                        Value::String(Utc::now().to_rfc3339()),
                    );
                }
                if let Err(e) = self
                    .call(self.remote.upsert(record.entity, record.entity_id, &merged))
                    .await
                {
                    return Ok(DispatchOutcome::RemoteFailed(e));
                }
                // Mirror the merged state locally so the cache matches
                // what the backend now holds.
                self.store.upsert_payload(record.entity, &merged).await?;
                Ok(DispatchOutcome::Done)
            }
            MergeOutcome::Conflict(fields) => Ok(DispatchOutcome::Conflict(fields)),
        }
    }

    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match timeout(self.policy.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// Queued mutations awaiting a manual decision.
    pub async fn conflicts(&self) -> Result<Vec<MutationRecord>, QueueError> {
        Ok(self.log.list_by_status(MutationStatus::Conflict).await?)
    }

    /// Record counts by status, for the sync status surface.
    pub async fn status_counts(&self) -> Result<Vec<(MutationStatus, i64)>, QueueError> {
        Ok(self.log.status_counts().await?)
    }

    /// Manual resolution: keep the local edit. The payload's timestamp
    /// is re-stamped to now and the record resubmitted as pending; its
    /// base snapshot is cleared so the re-dispatch pushes the kept
    /// payload instead of re-merging against the stale base.
    pub async fn resolve_keep_mine(&self, seq: i64) -> Result<(), QueueError> {
        let record = self.conflicted(seq).await?;

        let now = Utc::now();
        let mut payload = record.payload;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("updated_at".to_string(), Value::String(now.to_rfc3339()));
        }
        self.store.upsert_payload(record.entity, &payload).await?;
        self.log.resubmit(seq, &payload, now).await?;
        tracing::info!(seq, "conflict resolved: keeping local edit");
        Ok(())
    }

    /// Manual resolution: accept the remote state. The queued mutation
    /// is discarded and the cache refreshed from the canonical row.
    pub async fn resolve_accept_remote(&self, seq: i64) -> Result<(), QueueError> {
        let record = self.conflicted(seq).await?;

        match self
            .call(self.remote.fetch(record.entity, record.entity_id))
            .await
        {
            Ok(Some(remote)) => self.store.upsert_payload(record.entity, &remote).await?,
            Ok(None) => self.store.delete(record.entity, record.entity_id).await?,
            Err(e) => return Err(QueueError::Remote(e)),
        }
        self.log.delete(seq).await?;
        tracing::info!(seq, "conflict resolved: accepted remote state");
        Ok(())
    }

    async fn conflicted(&self, seq: i64) -> Result<MutationRecord, QueueError> {
        let record = self.log.get(seq).await?.ok_or(QueueError::NotFound(seq))?;
        if record.status != MutationStatus::Conflict {
            return Err(QueueError::NotConflicted(seq));
        }
        Ok(record)
    }
}

/// Extracts the logical timestamp carried in an entity payload.
fn payload_timestamp(payload: &Value) -> Option<DateTime<Utc>> {
    payload
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Whether the remote row changed since the base snapshot was taken,
/// beyond the clock-skew grace window. Missing timestamps count as not
/// newer, which degrades to a direct push.
fn remote_is_newer(remote: &Value, base: &Value) -> bool {
    match (payload_timestamp(remote), payload_timestamp(base)) {
        (Some(remote_ts), Some(base_ts)) => {
            remote_ts > base_ts + chrono::Duration::milliseconds(CLOCK_SKEW_GRACE_MS)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::{Expense, Money};
    use crate::sync::testbackend::MockRemote;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        queue: MutationQueue<MockRemote>,
        remote: MockRemote,
        store: LocalStore,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        setup_with_policy(RetryPolicy::default()).await
    }

    async fn setup_with_policy(policy: RetryPolicy) -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let remote = MockRemote::new();
        TestContext {
            queue: MutationQueue::new(pool.clone(), remote.clone(), policy),
            remote,
            store: LocalStore::new(pool),
            _temp_dir: temp_dir,
        }
    }

    fn sample_expense() -> Expense {
        Expense::new(
            Uuid::new_v4(),
            "Dinner",
            Money::new(4000, "EUR"),
            "alice",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
        .with_split(vec!["alice".to_string(), "bob".to_string()])
    }

    fn payload(expense: &Expense) -> Value {
        serde_json::to_value(expense).unwrap()
    }

    /// Shifts a payload's updated_at by whole seconds.
    fn shift_timestamp(value: &mut Value, seconds: i64) {
        let ts = payload_timestamp(value).unwrap() + chrono::Duration::seconds(seconds);
        value["updated_at"] = json!(ts.to_rfc3339());
    }

    #[tokio::test]
    async fn test_insert_dispatch_clears_record() {
        let ctx = setup().await;
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert!(report.ran);
        assert_eq!(report.dispatched, 1);
        assert!(ctx.remote.row(EntityKind::Expenses, expense.id).is_some());
        assert!(ctx.queue.status_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_dispatch_clears_record() {
        let ctx = setup().await;
        let expense = sample_expense();
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, payload(&expense));

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Delete,
                json!({"id": expense.id}),
                None,
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert!(ctx.remote.row(EntityKind::Expenses, expense.id).is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_record_for_retry() {
        let ctx = setup().await;
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        ctx.remote.set_failing(true);
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 0);

        let counts = ctx.queue.status_counts().await.unwrap();
        assert_eq!(counts, vec![(MutationStatus::Failed, 1)]);

        // Connectivity restored: the next drain retries and succeeds.
        ctx.remote.set_failing(false);
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert!(ctx.remote.row(EntityKind::Expenses, expense.id).is_some());
        assert!(ctx.queue.status_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_marks_failed_too() {
        let ctx = setup().await;
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        ctx.remote.set_rejecting(true);
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.failed, 1);
        let counts = ctx.queue.status_counts().await.unwrap();
        assert_eq!(counts, vec![(MutationStatus::Failed, 1)]);
    }

    #[tokio::test]
    async fn test_update_remote_unchanged_pushes_local_payload() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, base.clone());

        let mut local = base.clone();
        local["title"] = json!("Dinner at the port");
        shift_timestamp(&mut local, 30);

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local.clone(),
                Some(base),
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row["title"], json!("Dinner at the port"));
    }

    #[tokio::test]
    async fn test_update_within_skew_grace_pushes_directly() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);

        // Remote half a second "newer" than the base: inside the grace
        // window, treated as unchanged.
        let mut remote_row = base.clone();
        remote_row["updated_at"] = json!(
            (payload_timestamp(&base).unwrap() + chrono::Duration::milliseconds(500)).to_rfc3339()
        );
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, remote_row);

        let mut local = base.clone();
        local["title"] = json!("Updated");
        shift_timestamp(&mut local, 30);

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row["title"], json!("Updated"));
    }

    #[tokio::test]
    async fn test_update_remote_newer_disjoint_merges() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);

        // Remote changed the cost after we snapshotted.
        let mut remote_row = base.clone();
        remote_row["cost"] = json!({"amount": 4500, "currency": "EUR"});
        shift_timestamp(&mut remote_row, 60);
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, remote_row);

        // We changed the title.
        let mut local = base.clone();
        local["title"] = json!("Harbor dinner");
        shift_timestamp(&mut local, 30);

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.conflicts, 0);

        // Remote row carries both changes.
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row["title"], json!("Harbor dinner"));
        assert_eq!(row["cost"]["amount"], json!(4500));

        // And the merged state was mirrored into the local cache.
        let cached = ctx
            .store
            .expenses()
            .get_by_id(expense.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.title, "Harbor dinner");
        assert_eq!(cached.cost, Money::new(4500, "EUR"));
    }

    #[tokio::test]
    async fn test_update_overlap_conflicts_without_partial_write() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);

        let mut remote_row = base.clone();
        remote_row["title"] = json!("Their title");
        shift_timestamp(&mut remote_row, 60);
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, remote_row.clone());

        let mut local = base.clone();
        local["title"] = json!("My title");
        shift_timestamp(&mut local, 30);

        let seq = ctx
            .queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.dispatched, 0);

        // No partial write: the remote row is untouched.
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row, remote_row);

        let conflicts = ctx.queue.conflicts().await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].seq, seq);

        // A later drain never auto-resolves it.
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.conflicts, 0);
        assert_eq!(report.dispatched, 0);
        assert_eq!(ctx.queue.conflicts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_keep_mine_resubmits() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);

        let mut remote_row = base.clone();
        remote_row["title"] = json!("Their title");
        shift_timestamp(&mut remote_row, 60);
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, remote_row);

        let mut local = base.clone();
        local["title"] = json!("My title");
        shift_timestamp(&mut local, 30);

        let seq = ctx
            .queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();
        ctx.queue.process_queue().await.unwrap();

        ctx.queue.resolve_keep_mine(seq).await.unwrap();
        let record = ctx.queue.conflicts().await.unwrap();
        assert!(record.is_empty());

        // The re-stamped payload is now newer than the remote row, so
        // the next drain pushes it through.
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row["title"], json!("My title"));
    }

    #[tokio::test]
    async fn test_resolve_accept_remote_discards() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);
        ctx.store.expenses().upsert(&expense).await.unwrap();

        let mut remote_row = base.clone();
        remote_row["title"] = json!("Their title");
        shift_timestamp(&mut remote_row, 60);
        ctx.remote
            .set_row(EntityKind::Expenses, expense.id, remote_row);

        let mut local = base.clone();
        local["title"] = json!("My title");
        shift_timestamp(&mut local, 30);

        let seq = ctx
            .queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();
        ctx.queue.process_queue().await.unwrap();

        ctx.queue.resolve_accept_remote(seq).await.unwrap();
        assert!(ctx.queue.status_counts().await.unwrap().is_empty());

        // Local cache reflects the remote state again.
        let cached = ctx
            .store
            .expenses()
            .get_by_id(expense.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.title, "Their title");
    }

    #[tokio::test]
    async fn test_resolution_requires_conflict_status() {
        let ctx = setup().await;
        let expense = sample_expense();
        let seq = ctx
            .queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        assert!(matches!(
            ctx.queue.resolve_keep_mine(seq).await,
            Err(QueueError::NotConflicted(_))
        ));
        assert!(matches!(
            ctx.queue.resolve_accept_remote(9999).await,
            Err(QueueError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn test_single_flight_concurrent_drain_is_noop() {
        let ctx = setup().await;
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        let (first, second) = tokio::join!(ctx.queue.process_queue(), ctx.queue.process_queue());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(first.ran != second.ran, "exactly one drain should run");
        assert_eq!(first.dispatched + second.dispatched, 1);
    }

    #[tokio::test]
    async fn test_same_entity_blocked_after_failure() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                base.clone(),
                None,
            )
            .await
            .unwrap();
        let mut updated = base.clone();
        updated["title"] = json!("Updated");
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                updated,
                Some(base),
            )
            .await
            .unwrap();

        // A different entity keeps flowing.
        let other = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                other.id,
                Operation::Insert,
                payload(&other),
                None,
            )
            .await
            .unwrap();

        ctx.remote.fail_times(1);
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dispatched, 1);
        assert!(ctx.remote.row(EntityKind::Expenses, other.id).is_some());
    }

    #[tokio::test]
    async fn test_retry_ceiling_skips_record() {
        let ctx = setup_with_policy(RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        })
        .await;
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();

        ctx.remote.set_failing(true);
        ctx.queue.process_queue().await.unwrap();
        ctx.queue.process_queue().await.unwrap();

        // Two attempts used up; even with the network back the record
        // is skipped, not dispatched and not deleted.
        ctx.remote.set_failing(false);
        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dispatched, 0);
        let counts = ctx.queue.status_counts().await.unwrap();
        assert_eq!(counts, vec![(MutationStatus::Failed, 1)]);
    }

    #[tokio::test]
    async fn test_enqueue_never_touches_network() {
        let ctx = setup().await;
        ctx.remote.set_failing(true);
        let expense = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Insert,
                payload(&expense),
                None,
            )
            .await
            .unwrap();
        assert_eq!(ctx.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_records_dispatch_oldest_first() {
        let ctx = setup().await;
        let first = sample_expense();
        let second = sample_expense();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                first.id,
                Operation::Insert,
                payload(&first),
                None,
            )
            .await
            .unwrap();
        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                second.id,
                Operation::Insert,
                payload(&second),
                None,
            )
            .await
            .unwrap();

        ctx.queue.process_queue().await.unwrap();
        assert_eq!(
            ctx.remote.op_log(),
            vec![
                format!("upsert expenses/{}", first.id),
                format!("upsert expenses/{}", second.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_with_missing_remote_row_upserts() {
        let ctx = setup().await;
        let expense = sample_expense();
        let base = payload(&expense);
        let mut local = base.clone();
        local["title"] = json!("Recreated");

        ctx.queue
            .enqueue(
                EntityKind::Expenses,
                expense.id,
                Operation::Update,
                local,
                Some(base),
            )
            .await
            .unwrap();

        let report = ctx.queue.process_queue().await.unwrap();
        assert_eq!(report.dispatched, 1);
        let row = ctx.remote.row(EntityKind::Expenses, expense.id).unwrap();
        assert_eq!(row["title"], json!("Recreated"));
    }
}
