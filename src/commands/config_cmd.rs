//! Config inspection command.

use clap::{Args, Subcommand};

use crate::config::Config;

/// Manage configuration
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Option<ConfigSubcommand>,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Show the resolved configuration and where each value came from
    Show,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match self.command {
            None | Some(ConfigSubcommand::Show) => self.show(config),
        }
    }

    fn show(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Configuration");
        println!("=============");
        println!();
        match &config.config_file {
            Some(path) => println!("Config file:   {}", path.display()),
            None => println!(
                "Config file:   none (looked in {})",
                Config::default_config_path().display()
            ),
        }
        println!(
            "Database:      {} [{}]",
            config.database_path.value.display(),
            config.database_path.source
        );
        println!(
            "Member id:     {} [{}]",
            config.member_id.value, config.member_id.source
        );
        println!();
        match &config.sync.server_url {
            Some(url) => {
                println!("Sync server:   {}", url);
                println!(
                    "Auto-sync:     {}",
                    if config.sync.auto_sync { "on" } else { "off" }
                );
                if let Some(max) = config.sync.max_retry_attempts {
                    println!("Retry ceiling: {} attempts", max);
                }
            }
            None => println!("Sync:          not configured"),
        }
        Ok(())
    }
}
