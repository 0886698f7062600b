//! The piggy-bank report: per-day leftovers and the rolling balance.

use chrono::{Local, NaiveDate};
use clap::Args;
use uuid::Uuid;

use super::open_pool;
use crate::budget::{self, BudgetInputs};
use crate::config::Config;
use crate::sync::LocalStore;

/// Show the daily-budget piggy bank for a trip
#[derive(Debug, Args)]
pub struct BudgetCommand {
    /// Trip id
    trip: Uuid,
    /// Compute as of this day instead of today (YYYY-MM-DD)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

impl BudgetCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let pool = open_pool(config).await?;
        let store = LocalStore::new(pool);

        let trip = store
            .trips()
            .get_by_id(self.trip)
            .await?
            .ok_or_else(|| format!("No trip with id {}", self.trip))?;

        let (daily_budget, enabled_at) = match (&trip.daily_budget, trip.budget_enabled_at) {
            (Some(amount), Some(enabled_at)) => (amount.clone(), enabled_at),
            _ => {
                println!(
                    "No daily budget set for '{}'. Enable one with: tripmate trip budget {} --daily <amount>",
                    trip.name, trip.id
                );
                return Ok(());
            }
        };

        let today = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let expenses = store.expenses().get_by_trip(trip.id).await?;

        let summary = budget::compute(&BudgetInputs {
            trip_start: trip.start_date,
            today,
            activated_on: Some(enabled_at.date_naive()),
            daily_budget: daily_budget.clone(),
            party: &config.member_id.value,
            expenses: &expenses,
        })?;

        println!("Piggy bank for '{}' ({}/day)", trip.name, daily_budget);
        println!();

        if summary.days.is_empty() {
            println!("No completed days in the budget window yet.");
        } else {
            for entry in &summary.days {
                let marker = if entry.leftover.is_negative() { "!" } else { " " };
                println!(
                    "  {}  spent {:>12}  leftover {:>12} {}",
                    entry.day, entry.spent.to_string(), entry.leftover.to_string(), marker
                );
            }
        }

        println!();
        println!("Balance:     {}", summary.balance);
        println!("Spent today: {} (not counted until tomorrow)", summary.spent_today);

        Ok(())
    }
}
