use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;
use super::split::{self, SplitError};

/// A single expense on a trip.
///
/// `split_with` lists the parties sharing the cost; `split_details`
/// optionally overrides the equal split with explicit per-party amounts
/// that must sum to `cost` exactly (see [`Expense::validate_split`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub title: String,
    pub cost: Money,
    /// Party that fronted the money.
    pub paid_by: String,
    /// Parties sharing the cost, in stable order.
    pub split_with: Vec<String>,
    /// Explicit per-party amounts overriding the equal split.
    pub split_details: Option<BTreeMap<String, Money>>,
    /// Private expenses stay out of shared ledgers.
    pub is_private: bool,
    /// Whether this expense counts against the daily budget.
    pub is_daily_expense: bool,
    pub spent_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        trip_id: Uuid,
        title: impl Into<String>,
        cost: Money,
        paid_by: impl Into<String>,
        spent_on: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        let paid_by = paid_by.into();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            title: title.into(),
            cost,
            split_with: vec![paid_by.clone()],
            paid_by,
            split_details: None,
            is_private: false,
            is_daily_expense: true,
            spent_on,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_split(mut self, split_with: Vec<String>) -> Self {
        self.split_with = split_with;
        self
    }

    pub fn with_split_details(mut self, details: BTreeMap<String, Money>) -> Self {
        self.split_details = Some(details);
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_daily(mut self, is_daily_expense: bool) -> Self {
        self.is_daily_expense = is_daily_expense;
        self
    }

    /// Checks the custom-split invariant: when `split_details` is set,
    /// its values sum to `cost` exactly in the cost's currency.
    pub fn validate_split(&self) -> Result<(), SplitError> {
        match &self.split_details {
            Some(details) => split::validate_custom(&self.cost, details),
            None => Ok(()),
        }
    }

    /// Resolves one party's share of this expense.
    ///
    /// A custom split fully determines every share (absent party = zero).
    /// Otherwise the cost is split equally via the allocator across
    /// `split_with`, with the party's share picked by position; parties
    /// outside the split owe zero.
    pub fn share_of(&self, party: &str) -> Result<Money, SplitError> {
        if let Some(details) = &self.split_details {
            return Ok(details
                .get(party)
                .cloned()
                .unwrap_or_else(|| Money::zero(self.cost.currency())));
        }
        match self.split_with.iter().position(|m| m == party) {
            Some(index) => {
                let shares = split::allocate(&self.cost, self.split_with.len())?;
                Ok(shares[index].clone())
            }
            None => Ok(Money::zero(self.cost.currency())),
        }
    }
}
