//! Mutation log records: the durable intent captured for every local
//! write, later dispatched to the remote backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The synced entity tables, one variant per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Trips,
    Expenses,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Trips => "trips",
            EntityKind::Expenses => "expenses",
        }
    }

    /// Fields that participate in three-way merge for this table.
    ///
    /// Ids and bookkeeping timestamps are excluded; adding an entity
    /// type means adding a variant and its field list here, not a new
    /// merge code path.
    pub fn mergeable_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Trips => &[
                "name",
                "destination",
                "currency",
                "start_date",
                "end_date",
                "members",
                "daily_budget",
                "budget_enabled_at",
            ],
            EntityKind::Expenses => &[
                "title",
                "cost",
                "paid_by",
                "split_with",
                "split_details",
                "is_private",
                "is_daily_expense",
                "spent_on",
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trips" => Ok(EntityKind::Trips),
            "expenses" => Ok(EntityKind::Expenses),
            _ => Err(format!("Unknown entity table '{}'", s)),
        }
    }
}

/// The write operation a mutation record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(format!("Unknown mutation operation '{}'", s)),
        }
    }
}

/// Lifecycle state of a queued mutation.
///
/// Pending records are awaiting dispatch, Syncing records are in
/// flight, Failed records are eligible for re-dispatch on the next
/// drain, and Conflict records wait for a manual decision. Records are
/// only ever removed on confirmed remote success or an explicit
/// accept-remote resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Pending,
    Syncing,
    Failed,
    Conflict,
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationStatus::Pending => write!(f, "pending"),
            MutationStatus::Syncing => write!(f, "syncing"),
            MutationStatus::Failed => write!(f, "failed"),
            MutationStatus::Conflict => write!(f, "conflict"),
        }
    }
}

impl FromStr for MutationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MutationStatus::Pending),
            "syncing" => Ok(MutationStatus::Syncing),
            "failed" => Ok(MutationStatus::Failed),
            "conflict" => Ok(MutationStatus::Conflict),
            _ => Err(format!("Unknown mutation status '{}'", s)),
        }
    }
}

/// One entry in the durable mutation log.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Log position; dispatch order is ascending `seq`.
    pub seq: i64,
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub op: Operation,
    /// The intended new state.
    pub payload: Value,
    /// Entity state snapshot captured at enqueue time; present for
    /// updates only and used as the merge base.
    pub base_payload: Option<Value>,
    pub status: MutationStatus,
    pub retry_count: i64,
    pub enqueued_at: DateTime<Utc>,
}
