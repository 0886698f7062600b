//! Split allocation: dividing a monetary total among N parties with no
//! remainder lost.
//!
//! Both the equal-split path and custom-split validation funnel through
//! here so that split sums can never drift from the underlying cost.

use std::collections::BTreeMap;

use thiserror::Error;

use super::money::Money;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("cannot split among zero participants")]
    NoParticipants,
    #[error("split currency {share} does not match cost currency {cost}")]
    CurrencyMismatch { cost: String, share: String },
    #[error("split shares sum to {actual} but the cost is {expected}")]
    SumMismatch { expected: Money, actual: Money },
}

/// Divides `total` into exactly `n` shares whose sum equals `total`.
///
/// Each share gets the floor quotient; the remaining minor units are
/// handed out one each to the first `remainder` shares, in index order.
/// Shares therefore never differ by more than one minor unit.
pub fn allocate(total: &Money, n: usize) -> Result<Vec<Money>, SplitError> {
    if n == 0 {
        return Err(SplitError::NoParticipants);
    }
    let count = n as i64;
    let quotient = total.amount().div_euclid(count);
    let remainder = total.amount().rem_euclid(count);

    let shares = (0..count)
        .map(|i| {
            let extra = if i < remainder { 1 } else { 0 };
            Money::new(quotient + extra, total.currency())
        })
        .collect();
    Ok(shares)
}

/// Validates a custom split against the total it must cover.
///
/// Every share must carry the cost's currency and the shares must sum to
/// the total exactly; at integer minor-unit precision there is no
/// rounding slack to tolerate.
pub fn validate_custom(
    total: &Money,
    shares: &BTreeMap<String, Money>,
) -> Result<(), SplitError> {
    if shares.is_empty() {
        return Err(SplitError::NoParticipants);
    }
    let mut sum = 0i64;
    for share in shares.values() {
        if share.currency() != total.currency() {
            return Err(SplitError::CurrencyMismatch {
                cost: total.currency().to_string(),
                share: share.currency().to_string(),
            });
        }
        sum += share.amount();
    }
    if sum != total.amount() {
        return Err(SplitError::SumMismatch {
            expected: total.clone(),
            actual: Money::new(sum, total.currency()),
        });
    }
    Ok(())
}
