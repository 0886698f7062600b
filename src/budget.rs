//! Daily-budget ("piggy bank") ledger.
//!
//! A pure computation over a trip's expenses: no state is owned or
//! persisted here, and the result is always recomputed from the source
//! records. For every completed day of the budget window the leftover
//! is `daily_budget − that day's qualifying spend`; the ledger balance
//! is the sum of those leftovers. Today is always reported separately
//! and never folds into the balance.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{Expense, Money, MoneyError, SplitError};

#[derive(Debug)]
pub enum BudgetError {
    Money(MoneyError),
    Split(SplitError),
}

impl std::fmt::Display for BudgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetError::Money(e) => write!(f, "{}", e),
            BudgetError::Split(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BudgetError {}

impl From<MoneyError> for BudgetError {
    fn from(e: MoneyError) -> Self {
        BudgetError::Money(e)
    }
}

impl From<SplitError> for BudgetError {
    fn from(e: SplitError) -> Self {
        BudgetError::Split(e)
    }
}

/// Inputs to the ledger computation.
pub struct BudgetInputs<'a> {
    pub trip_start: NaiveDate,
    pub today: NaiveDate,
    /// Day the budget was (last) switched on. Records dated strictly
    /// before this are excluded entirely: a prior activation cycle's
    /// history is discarded, not carried forward.
    pub activated_on: Option<NaiveDate>,
    pub daily_budget: Money,
    /// The party whose shares are being tallied.
    pub party: &'a str,
    pub expenses: &'a [Expense],
}

/// One completed day of the budget window.
#[derive(Debug, Clone, PartialEq)]
pub struct DayEntry {
    pub day: NaiveDate,
    pub spent: Money,
    /// `daily_budget − spent`; negative on overdraft days.
    pub leftover: Money,
}

/// The computed piggy bank.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSummary {
    /// Completed days, oldest first.
    pub days: Vec<DayEntry>,
    /// Sum of the day leftovers.
    pub balance: Money,
    /// Today's qualifying spend; excluded from `balance` regardless of
    /// how far it overdrafts.
    pub spent_today: Money,
}

/// Computes the piggy bank for one party.
///
/// The window runs over whole calendar days in
/// `[max(trip_start, activated_on), today)`. A record qualifies when it
/// is shared (not private), flagged as a daily expense, dated on or
/// after the activation day, and resolves to a non-zero share for the
/// party (explicit split amount, else equal split, else zero).
pub fn compute(inputs: &BudgetInputs) -> Result<BudgetSummary, BudgetError> {
    let currency = inputs.daily_budget.currency();
    let window_start = match inputs.activated_on {
        Some(activated) if activated > inputs.trip_start => activated,
        _ => inputs.trip_start,
    };

    let mut spend_by_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    for expense in inputs.expenses {
        if expense.is_private || !expense.is_daily_expense {
            continue;
        }
        if let Some(activated) = inputs.activated_on {
            if expense.spent_on < activated {
                continue;
            }
        }
        let share = expense.share_of(inputs.party)?;
        if share.is_zero() {
            continue;
        }
        let day_total = spend_by_day
            .entry(expense.spent_on)
            .or_insert_with(|| Money::zero(currency));
        *day_total = day_total.checked_add(&share)?;
    }

    let zero = Money::zero(currency);
    let mut days = Vec::new();
    let mut balance = Money::zero(currency);
    let mut day = window_start;
    while day < inputs.today {
        let spent = spend_by_day.get(&day).cloned().unwrap_or_else(|| zero.clone());
        let leftover = inputs.daily_budget.checked_sub(&spent)?;
        balance = balance.checked_add(&leftover)?;
        days.push(DayEntry { day, spent, leftover });
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    let spent_today = spend_by_day
        .get(&inputs.today)
        .cloned()
        .unwrap_or_else(|| zero.clone());

    Ok(BudgetSummary {
        days,
        balance,
        spent_today,
    })
}
