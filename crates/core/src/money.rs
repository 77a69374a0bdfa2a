//! USD amounts held as integer cents.
//!
//! The payment backend binds every authorization to an exact decimal
//! amount with two fractional digits.  [`UsdAmount`] keeps the value
//! in whole cents so formatting is exact and never drifts, and it can
//! only be constructed for strictly positive amounts.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Cents per US dollar.
pub const CENTS_PER_USD: u64 = 100;

/// A strictly positive USD amount, stored in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsdAmount {
    cents: u64,
}

impl UsdAmount {
    /// Build an amount from whole cents. Zero is rejected.
    pub fn from_cents(cents: u64) -> Result<Self, CoreError> {
        if cents == 0 {
            return Err(CoreError::InvalidAmount(
                "amount must be strictly positive".to_string(),
            ));
        }
        Ok(Self { cents })
    }

    /// Build an amount from a floating-point dollar value.
    ///
    /// The value is rounded to the nearest cent. NaN, infinities, and
    /// anything that rounds to zero or below are rejected.
    pub fn from_usd(amount: f64) -> Result<Self, CoreError> {
        if !amount.is_finite() {
            return Err(CoreError::InvalidAmount(format!(
                "amount must be numeric, got {amount}"
            )));
        }
        if amount <= 0.0 {
            return Err(CoreError::InvalidAmount(format!(
                "amount must be strictly positive, got {amount}"
            )));
        }
        let cents = (amount * CENTS_PER_USD as f64).round();
        if cents < 1.0 || cents > u64::MAX as f64 {
            return Err(CoreError::InvalidAmount(format!(
                "amount {amount} is not representable in cents"
            )));
        }
        Self::from_cents(cents as u64)
    }

    pub fn cents(self) -> u64 {
        self.cents
    }

    /// Dollar value as a float, for display arithmetic only.
    pub fn as_usd(self) -> f64 {
        self.cents as f64 / CENTS_PER_USD as f64
    }
}

impl fmt::Display for UsdAmount {
    /// Always renders exactly two fractional digits, e.g. `9.99`, `10.00`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.cents / CENTS_PER_USD,
            self.cents % CENTS_PER_USD
        )
    }
}

impl FromStr for UsdAmount {
    type Err = CoreError;

    /// Parse a decimal string such as `"9.99"`, `"10"` or `"0.5"`.
    ///
    /// More than two fractional digits, signs, and non-numeric input are
    /// rejected rather than rounded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || CoreError::InvalidAmount(format!("'{s}' is not a valid USD amount"));

        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
            || frac.len() > 2
        {
            return Err(invalid());
        }

        let whole_cents = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .ok()
                .and_then(|w| w.checked_mul(CENTS_PER_USD))
                .ok_or_else(invalid)?
        };
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => frac.parse::<u64>().map_err(|_| invalid())?,
        };

        let cents = whole_cents.checked_add(frac_cents).ok_or_else(invalid)?;
        Self::from_cents(cents)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
