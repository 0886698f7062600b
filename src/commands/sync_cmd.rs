//! Sync CLI commands: queue drain, status, the live feed watcher, and
//! the manual conflict-resolution surface.

use clap::{Args, Subcommand};
use tokio::sync::mpsc;

use super::{build_queue, open_pool};
use crate::config::Config;
use crate::sync::{FeedClient, HttpBackend, LocalStore, MutationStatus, Reconciler};

/// Sync with the remote backend
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and queue state
    Status,
    /// Follow the backend change feed and keep the local cache current
    Watch,
    /// Inspect and resolve merge conflicts
    Conflicts(ConflictsCommand),
}

#[derive(Debug, Args)]
struct ConflictsCommand {
    #[command(subcommand)]
    command: ConflictsSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConflictsSubcommand {
    /// List queued mutations awaiting a decision
    List,
    /// Re-stamp and resubmit your version
    KeepMine {
        /// Queue position from `sync conflicts list`
        seq: i64,
    },
    /// Discard your version and take the server's
    AcceptRemote {
        /// Queue position from `sync conflicts list`
        seq: i64,
    },
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.drain(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
            Some(SyncSubcommand::Watch) => self.watch(config).await,
            Some(SyncSubcommand::Conflicts(cmd)) => self.conflicts(config, cmd).await,
        }
    }

    async fn drain(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        if !config.sync.is_configured() {
            return Err("Sync not configured. Add server_url and api_key to config.".into());
        }
        let pool = open_pool(config).await?;
        let queue = build_queue(config, pool);

        println!("Syncing with server...");
        let report = queue.process_queue().await?;

        if !report.ran {
            println!("Another sync is already running.");
            return Ok(());
        }
        println!("  ✓ {} pushed", report.dispatched);
        if report.failed > 0 {
            println!("  ✗ {} failed (will retry)", report.failed);
        }
        if report.conflicts > 0 {
            println!(
                "  ! {} in conflict — resolve with: tripmate sync conflicts list",
                report.conflicts
            );
        }
        if report.skipped > 0 {
            println!("  - {} skipped", report.skipped);
        }
        Ok(())
    }

    async fn status(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"https://sync.example.com\"");
            println!("    api_key: \"...\"");
            println!();
            println!("Or set environment variables:");
            println!("  TRIPMATE_SYNC_URL / TRIPMATE_SYNC_API_KEY");
            return Ok(());
        }

        println!(
            "Server:    {}",
            config.sync.server_url.as_deref().unwrap_or("-")
        );
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        let pool = open_pool(config).await?;
        let queue = build_queue(config, pool);
        let counts = queue.status_counts().await?;
        if counts.is_empty() {
            println!("Queue:     empty");
        } else {
            for (status, count) in counts {
                let hint = match status {
                    MutationStatus::Conflict => "  (tripmate sync conflicts list)",
                    _ => "",
                };
                println!("Queue:     {} {}{}", count, status, hint);
            }
        }
        Ok(())
    }

    async fn watch(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let (server_url, api_key) = match (&config.sync.server_url, &config.sync.api_key) {
            (Some(url), Some(key)) => (url.clone(), key.clone()),
            _ => return Err("Sync not configured. Add server_url and api_key to config.".into()),
        };

        let pool = open_pool(config).await?;
        let store = LocalStore::new(pool);
        let remote = HttpBackend::from_config(&config.sync);
        let reconciler = Reconciler::new(store, remote);
        let feed = FeedClient::new(server_url, api_key);

        println!("Watching the change feed (ctrl-c to stop)...");
        let (tx, rx) = mpsc::channel(64);
        let (feed_result, ()) = tokio::join!(feed.run(tx), reconciler.run(rx));
        feed_result?;
        Ok(())
    }

    async fn conflicts(
        &self,
        config: &Config,
        cmd: &ConflictsCommand,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let pool = open_pool(config).await?;
        let queue = build_queue(config, pool);

        match &cmd.command {
            ConflictsSubcommand::List => {
                let conflicts = queue.conflicts().await?;
                if conflicts.is_empty() {
                    println!("No conflicts. Everything merged cleanly.");
                    return Ok(());
                }
                println!("Conflicted mutations:");
                for record in conflicts {
                    println!(
                        "  #{}  {} {}  {}  enqueued {}",
                        record.seq,
                        record.op,
                        record.entity,
                        record.entity_id,
                        record.enqueued_at.format("%Y-%m-%d %H:%M"),
                    );
                }
                println!();
                println!("Resolve with: tripmate sync conflicts keep-mine <seq>");
                println!("         or:  tripmate sync conflicts accept-remote <seq>");
            }
            ConflictsSubcommand::KeepMine { seq } => {
                queue.resolve_keep_mine(*seq).await?;
                println!("Kept your version of #{}; it will push on the next sync.", seq);
            }
            ConflictsSubcommand::AcceptRemote { seq } => {
                queue.resolve_accept_remote(*seq).await?;
                println!("Accepted the server's version; #{} discarded.", seq);
            }
        }
        Ok(())
    }
}
