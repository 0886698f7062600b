//! Tripmate
//!
//! Offline-first shared trip expense tracking: a local-first sync
//! engine (durable cache, mutation queue, three-way merge, change-feed
//! reconciler) around an exact monetary ledger (fixed-point money,
//! zero-loss split allocation, daily-budget piggy bank).

pub mod budget;
pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod sync;

pub use budget::{BudgetError, BudgetInputs, BudgetSummary, DayEntry};
pub use config::{Config, ConfigError, SyncConfig};
pub use models::{Expense, Money, MoneyError, SplitError, Trip};
pub use sync::{
    ChangeEvent, DrainReport, EntityKind, FeedClient, HttpBackend, LocalStore, MergeOutcome,
    MutationQueue, MutationRecord, MutationStatus, Operation, OptimisticWriter, Reconciler,
    RemoteBackend, RetryPolicy,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
