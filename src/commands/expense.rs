//! Expense CLI commands.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{build_queue, maybe_drain, open_pool};
use crate::config::Config;
use crate::models::{Expense, Money};
use crate::sync::{LocalStore, OptimisticWriter};

/// Track expenses
#[derive(Debug, Args)]
pub struct ExpenseCommand {
    #[command(subcommand)]
    command: ExpenseSubcommand,
}

#[derive(Debug, Subcommand)]
enum ExpenseSubcommand {
    /// Add an expense to a trip
    Add {
        /// Trip id
        trip: Uuid,
        /// What the money went to
        title: String,
        /// Amount in the trip currency, e.g. "40" or "39.90"
        amount: String,
        /// Day of the expense (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Party that fronted the money (defaults to you)
        #[arg(long)]
        paid_by: Option<String>,
        /// Comma-separated party ids sharing the cost (defaults to the
        /// payer alone)
        #[arg(long, value_delimiter = ',')]
        split_with: Vec<String>,
        /// Explicit shares as party=amount pairs, overriding the equal
        /// split; must sum to the amount exactly
        #[arg(long = "share", value_name = "PARTY=AMOUNT")]
        shares: Vec<String>,
        /// Keep this expense out of shared ledgers
        #[arg(long)]
        private: bool,
        /// Exclude from the daily budget (flights, hotels, ...)
        #[arg(long)]
        one_off: bool,
    },

    /// List a trip's expenses
    List {
        /// Trip id
        trip: Uuid,
    },

    /// Edit an expense
    Edit {
        /// Expense id
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        paid_by: Option<String>,
        #[arg(long, value_delimiter = ',')]
        split_with: Option<Vec<String>>,
        /// Mark or unmark as private
        #[arg(long)]
        private: Option<bool>,
        /// Mark or unmark as counting against the daily budget
        #[arg(long)]
        daily: Option<bool>,
    },

    /// Remove an expense
    Remove {
        /// Expense id
        id: Uuid,
    },
}

impl ExpenseCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let pool = open_pool(config).await?;
        let store = LocalStore::new(pool.clone());
        let queue = build_queue(config, pool);
        let writer = OptimisticWriter::new(&store, &queue);

        match &self.command {
            ExpenseSubcommand::Add {
                trip,
                title,
                amount,
                date,
                paid_by,
                split_with,
                shares,
                private,
                one_off,
            } => {
                let trip_record = store
                    .trips()
                    .get_by_id(*trip)
                    .await?
                    .ok_or_else(|| format!("No trip with id {}", trip))?;

                let cost = Money::parse(amount, &trip_record.currency)?;
                let paid_by = paid_by
                    .clone()
                    .unwrap_or_else(|| config.member_id.value.clone());
                let spent_on = date.unwrap_or_else(|| Local::now().date_naive());

                let mut expense = Expense::new(*trip, title, cost, paid_by, spent_on)
                    .with_private(*private)
                    .with_daily(!*one_off);
                if !split_with.is_empty() {
                    expense = expense.with_split(split_with.clone());
                }
                if !shares.is_empty() {
                    let details = parse_shares(shares, &trip_record.currency)?;
                    if split_with.is_empty() {
                        expense = expense.with_split(details.keys().cloned().collect());
                    }
                    expense = expense.with_split_details(details);
                }

                writer.create_expense(&expense).await?;
                println!(
                    "Added '{}' ({}) on {} [{}]",
                    expense.title, expense.cost, expense.spent_on, expense.id
                );
                maybe_drain(config, &queue).await;
            }

            ExpenseSubcommand::List { trip } => {
                let expenses = store.expenses().get_by_trip(*trip).await?;
                if expenses.is_empty() {
                    println!("No expenses recorded for this trip.");
                    return Ok(());
                }
                for e in expenses {
                    let mut flags = Vec::new();
                    if e.is_private {
                        flags.push("private");
                    }
                    if !e.is_daily_expense {
                        flags.push("one-off");
                    }
                    let flags = if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", flags.join(", "))
                    };
                    println!(
                        "{}  {}  {}  {} paid, split {} ways{}",
                        e.id,
                        e.spent_on,
                        e.cost,
                        e.paid_by,
                        e.split_with.len(),
                        flags
                    );
                }
            }

            ExpenseSubcommand::Edit {
                id,
                title,
                amount,
                date,
                paid_by,
                split_with,
                private,
                daily,
            } => {
                let mut expense = store
                    .expenses()
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| format!("No expense with id {}", id))?;

                if let Some(title) = title {
                    expense.title = title.clone();
                }
                if let Some(amount) = amount {
                    expense.cost = Money::parse(amount, expense.cost.currency())?;
                }
                if let Some(date) = date {
                    expense.spent_on = *date;
                }
                if let Some(paid_by) = paid_by {
                    expense.paid_by = paid_by.clone();
                }
                if let Some(split_with) = split_with {
                    expense.split_with = split_with.clone();
                    // An explicit split list invalidates stale custom shares.
                    expense.split_details = None;
                }
                if let Some(private) = private {
                    expense.is_private = *private;
                }
                if let Some(daily) = daily {
                    expense.is_daily_expense = *daily;
                }

                writer.update_expense(&expense).await?;
                println!("Updated '{}' ({})", expense.title, expense.id);
                maybe_drain(config, &queue).await;
            }

            ExpenseSubcommand::Remove { id } => {
                let expense = store
                    .expenses()
                    .get_by_id(*id)
                    .await?
                    .ok_or_else(|| format!("No expense with id {}", id))?;
                writer.delete_expense(expense.id).await?;
                println!("Removed '{}'", expense.title);
                maybe_drain(config, &queue).await;
            }
        }

        Ok(())
    }
}

/// Parses `party=amount` pairs into explicit split shares.
fn parse_shares(
    pairs: &[String],
    currency: &str,
) -> Result<BTreeMap<String, Money>, Box<dyn std::error::Error>> {
    let mut details = BTreeMap::new();
    for pair in pairs {
        let (party, amount) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid share '{}'; expected PARTY=AMOUNT", pair))?;
        details.insert(party.trim().to_string(), Money::parse(amount.trim(), currency)?);
    }
    Ok(details)
}
