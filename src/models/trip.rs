use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;

/// A shared trip: the parent entity for expenses and the home of the
/// daily-budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub name: String,
    pub destination: String,
    /// Currency all of this trip's amounts are tracked in.
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Party ids of everyone on the trip.
    pub members: Vec<String>,
    pub daily_budget: Option<Money>,
    /// When the daily budget was last switched on. `None` means the
    /// piggy bank is off. Re-enabling re-stamps this, which discards
    /// the prior cycle from the ledger.
    pub budget_enabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        name: impl Into<String>,
        currency: impl Into<String>,
        start_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            destination: String::new(),
            currency: currency.into(),
            start_date,
            end_date: None,
            members: Vec::new(),
            daily_budget: None,
            budget_enabled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_members(mut self, members: Vec<String>) -> Self {
        self.members = members;
        self
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn is_member(&self, party: &str) -> bool {
        self.members.iter().any(|m| m == party)
    }

    /// Switches the daily budget on, stamping the activation time.
    pub fn enable_budget(&mut self, daily_budget: Money, now: DateTime<Utc>) {
        self.daily_budget = Some(daily_budget);
        self.budget_enabled_at = Some(now);
    }

    /// Switches the daily budget off.
    pub fn disable_budget(&mut self) {
        self.budget_enabled_at = None;
    }
}
