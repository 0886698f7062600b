//! Trip CLI commands: create and inspect trips, configure the daily
//! budget.

use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{build_queue, maybe_drain, open_pool};
use crate::config::Config;
use crate::models::{Money, Trip};
use crate::sync::{LocalStore, OptimisticWriter};

/// Manage trips
#[derive(Debug, Args)]
pub struct TripCommand {
    #[command(subcommand)]
    command: TripSubcommand,
}

#[derive(Debug, Subcommand)]
enum TripSubcommand {
    /// Create a new trip
    Create {
        /// Trip name
        name: String,
        /// Currency code for all amounts on this trip
        #[arg(long, default_value = "EUR")]
        currency: String,
        /// First day of the trip (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day of the trip (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Where the trip goes
        #[arg(long)]
        destination: Option<String>,
        /// Comma-separated party ids travelling together
        #[arg(long, value_delimiter = ',')]
        members: Vec<String>,
    },

    /// List all trips
    List,

    /// Show one trip
    Show {
        /// Trip id
        id: Uuid,
    },

    /// Configure the daily budget (piggy bank)
    Budget {
        /// Trip id
        id: Uuid,
        /// Daily budget amount, e.g. "75" or "82.50"
        #[arg(long, conflicts_with = "off")]
        daily: Option<String>,
        /// Switch the daily budget off
        #[arg(long)]
        off: bool,
    },
}

impl TripCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let pool = open_pool(config).await?;
        let store = LocalStore::new(pool.clone());
        let queue = build_queue(config, pool);
        let writer = OptimisticWriter::new(&store, &queue);

        match &self.command {
            TripSubcommand::Create {
                name,
                currency,
                start,
                end,
                destination,
                members,
            } => {
                let mut members = members.clone();
                if !members.iter().any(|m| m == &config.member_id.value) {
                    members.push(config.member_id.value.clone());
                }
                let mut trip = Trip::new(name, currency, *start).with_members(members);
                if let Some(end) = end {
                    trip = trip.with_end_date(*end);
                }
                if let Some(destination) = destination {
                    trip = trip.with_destination(destination);
                }

                writer.create_trip(&trip).await?;
                println!("Created trip '{}' ({})", trip.name, trip.id);
                maybe_drain(config, &queue).await;
            }

            TripSubcommand::List => {
                let trips = store.trips().list().await?;
                if trips.is_empty() {
                    println!("No trips yet. Create one with: tripmate trip create");
                    return Ok(());
                }
                for trip in trips {
                    let budget = match (&trip.daily_budget, trip.budget_enabled_at) {
                        (Some(amount), Some(_)) => format!("budget {}/day", amount),
                        _ => "no budget".to_string(),
                    };
                    println!(
                        "{}  {}  {} -> {}  [{}]",
                        trip.id,
                        trip.name,
                        trip.start_date,
                        trip.end_date
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "open".to_string()),
                        budget
                    );
                }
            }

            TripSubcommand::Show { id } => {
                let trip = store
                    .trips()
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| format!("No trip with id {}", id))?;
                let expenses = store.expenses().get_by_trip(*id).await?;

                println!("{}", trip.name);
                println!("{}", "=".repeat(trip.name.len()));
                if !trip.destination.is_empty() {
                    println!("Destination: {}", trip.destination);
                }
                println!("Currency:    {}", trip.currency);
                println!(
                    "Dates:       {} -> {}",
                    trip.start_date,
                    trip.end_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "open".to_string())
                );
                println!("Members:     {}", trip.members.join(", "));
                match (&trip.daily_budget, trip.budget_enabled_at) {
                    (Some(amount), Some(since)) => {
                        println!("Budget:      {}/day (since {})", amount, since.date_naive())
                    }
                    _ => println!("Budget:      off"),
                }
                println!("Expenses:    {}", expenses.len());
            }

            TripSubcommand::Budget { id, daily, off } => {
                let mut trip = store
                    .trips()
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| format!("No trip with id {}", id))?;

                if *off {
                    trip.disable_budget();
                    writer.update_trip(&trip).await?;
                    println!("Daily budget switched off for '{}'", trip.name);
                } else {
                    let daily = daily
                        .as_deref()
                        .ok_or("Pass --daily <amount> to set the budget, or --off")?;
                    let amount = Money::parse(daily, &trip.currency)?;
                    trip.enable_budget(amount.clone(), Utc::now());
                    writer.update_trip(&trip).await?;
                    println!(
                        "Daily budget for '{}' set to {} starting today",
                        trip.name, amount
                    );
                }
                maybe_drain(config, &queue).await;
            }
        }

        Ok(())
    }
}
