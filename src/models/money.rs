//! Money type for representing currency amounts.
//!
//! Internally stores amounts as an integer count of minor units (cents)
//! to avoid floating-point precision issues. Every operation is
//! currency-checked; mixing currencies is an error, never a coercion.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from money arithmetic and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("amount out of range")]
    Overflow,
    #[error("invalid money amount: '{0}'")]
    InvalidAmount(String),
}

/// A monetary amount: minor units (cents) plus a currency code.
///
/// Equality is exact-integer, so two amounts are equal only when both
/// the minor-unit count and the currency match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: String,
}

impl Money {
    /// Creates an amount from a minor-unit count (e.g. cents).
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }

    /// The amount in minor units.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// The currency code.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Self::new(self.amount.abs(), self.currency.clone())
    }

    /// Sign-flipped value.
    pub fn negated(&self) -> Self {
        Self::new(-self.amount, self.currency.clone())
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Subtracts an amount of the same currency.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Multiplies by an integer factor.
    pub fn scaled(&self, factor: i64) -> Result<Money, MoneyError> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Parses a decimal amount string into minor units.
    ///
    /// Accepts "10", "10.5", "-10.50". Digits beyond the second decimal
    /// place are rounded half-up (away from zero); this is the only
    /// place rounding happens.
    pub fn parse(input: &str, currency: impl Into<String>) -> Result<Money, MoneyError> {
        let raw = input.trim();
        let invalid = || MoneyError::InvalidAmount(input.to_string());

        let (negative, raw) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if raw.is_empty() {
            return Err(invalid());
        }

        let (whole_str, frac_str) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };
        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(invalid());
        }
        if !whole_str.chars().all(|c| c.is_ascii_digit())
            || !frac_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if whole_str.is_empty() {
            0
        } else {
            whole_str.parse().map_err(|_| invalid())?
        };

        let mut digits = frac_str.chars();
        let tens = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
        let units = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
        let mut cents = tens * 10 + units;
        // Half-up on the first dropped digit.
        if let Some(c) = digits.next() {
            if c.to_digit(10).unwrap_or(0) >= 5 {
                cents += 1;
            }
        }

        let amount = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(cents))
            .ok_or(MoneyError::Overflow)?;

        Ok(Money::new(
            if negative { -amount } else { amount },
            currency,
        ))
    }
}

impl PartialOrd for Money {
    /// Orders amounts of the same currency; mixed currencies are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        Some(self.amount.cmp(&other.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let m = Money::new(1050, "EUR");
        assert_eq!(m.amount(), 1050);
        assert_eq!(m.currency(), "EUR");
        assert!(m.is_positive());
        assert!(!m.is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::new(1000, "EUR");
        let b = Money::new(250, "EUR");
        assert_eq!(a.checked_add(&b).unwrap().amount(), 1250);
        assert_eq!(a.checked_sub(&b).unwrap().amount(), 750);
        assert_eq!(b.checked_sub(&a).unwrap().amount(), -750);
        assert_eq!(b.scaled(4).unwrap().amount(), 1000);
        assert_eq!(Money::new(-300, "EUR").abs().amount(), 300);
        assert_eq!(Money::new(300, "EUR").negated().amount(), -300);
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Money::new(100, "EUR");
        let usd = Money::new(100, "USD");
        assert!(matches!(
            eur.checked_add(&usd),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
        assert!(eur.partial_cmp(&usd).is_none());
        assert_ne!(eur, usd);
    }

    #[test]
    fn test_overflow() {
        let max = Money::new(i64::MAX, "EUR");
        assert_eq!(
            max.checked_add(&Money::new(1, "EUR")),
            Err(MoneyError::Overflow)
        );
        assert_eq!(max.scaled(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Money::parse("10", "EUR").unwrap().amount(), 1000);
        assert_eq!(Money::parse("10.5", "EUR").unwrap().amount(), 1050);
        assert_eq!(Money::parse("10.50", "EUR").unwrap().amount(), 1050);
        assert_eq!(Money::parse("-10.50", "EUR").unwrap().amount(), -1050);
        assert_eq!(Money::parse("0.05", "EUR").unwrap().amount(), 5);
        assert_eq!(Money::parse(".50", "EUR").unwrap().amount(), 50);
    }

    #[test]
    fn test_parse_rounds_half_up() {
        assert_eq!(Money::parse("1.005", "EUR").unwrap().amount(), 101);
        assert_eq!(Money::parse("1.004", "EUR").unwrap().amount(), 100);
        assert_eq!(Money::parse("1.0049", "EUR").unwrap().amount(), 100);
        // Away from zero for negative input.
        assert_eq!(Money::parse("-1.005", "EUR").unwrap().amount(), -101);
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "-", ".", "abc", "1.2.3", "12x", "1,50"] {
            assert!(
                matches!(Money::parse(input, "EUR"), Err(MoneyError::InvalidAmount(_))),
                "expected parse failure for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_ordering() {
        let a = Money::new(100, "EUR");
        let b = Money::new(200, "EUR");
        assert!(a < b);
        assert!(b > a);
        assert_eq!(a.partial_cmp(&Money::new(100, "EUR")), Some(Ordering::Equal));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(1050, "EUR").to_string(), "10.50 EUR");
        assert_eq!(Money::new(-1050, "EUR").to_string(), "-10.50 EUR");
        assert_eq!(Money::new(5, "USD").to_string(), "0.05 USD");
    }

    #[test]
    fn test_serde_shape() {
        let m = Money::new(1050, "EUR");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["amount"], 1050);
        assert_eq!(json["currency"], "EUR");
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }
}
