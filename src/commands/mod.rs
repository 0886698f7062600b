mod budget_cmd;
mod config_cmd;
mod expense;
mod sync_cmd;
mod trip;

pub use budget_cmd::BudgetCommand;
pub use config_cmd::ConfigCommand;
pub use expense::ExpenseCommand;
pub use sync_cmd::SyncCommand;
pub use trip::TripCommand;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::sync::{HttpBackend, MutationQueue, RemoteBackend, RetryPolicy};

pub(crate) async fn open_pool(config: &Config) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    Ok(crate::db::init_db(&config.database_path.value).await?)
}

pub(crate) fn build_queue(config: &Config, pool: SqlitePool) -> MutationQueue<HttpBackend> {
    MutationQueue::new(
        pool,
        HttpBackend::from_config(&config.sync),
        RetryPolicy::from_config(&config.sync),
    )
}

/// Drains the queue after a write when auto-sync is on. Failures are
/// logged, never surfaced as command errors: the mutation is already
/// durable locally.
pub(crate) async fn maybe_drain<R: RemoteBackend>(config: &Config, queue: &MutationQueue<R>) {
    if !config.sync.is_configured() || !config.sync.auto_sync {
        return;
    }
    match queue.process_queue().await {
        Ok(report) if report.ran => {
            tracing::debug!(
                dispatched = report.dispatched,
                failed = report.failed,
                conflicts = report.conflicts,
                "auto-sync drain finished"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "auto-sync drain failed"),
    }
}
