use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripmate::commands::{
    BudgetCommand, ConfigCommand, ExpenseCommand, SyncCommand, TripCommand,
};
use tripmate::config::Config;

#[derive(Parser)]
#[command(name = "tripmate")]
#[command(version)]
#[command(about = "Offline-first shared trip expense tracker", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage trips
    Trip(TripCommand),

    /// Track expenses
    Expense(ExpenseCommand),

    /// Show the daily-budget piggy bank
    Budget(BudgetCommand),

    /// Sync with the remote backend
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripmate=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match &cli.command {
        Commands::Trip(cmd) => cmd.run(&config).await,
        Commands::Expense(cmd) => cmd.run(&config).await,
        Commands::Budget(cmd) => cmd.run(&config).await,
        Commands::Sync(cmd) => cmd.run(&config).await,
        Commands::Config(cmd) => cmd.run(&config),
    }
}
