//! Type-safe price representation using decimal arithmetic.
//!
//! Listing prices and order totals are money: they use [`rust_decimal`]
//! rather than binary floats so that cart totals like `2×2.99 + 4×0.75`
//! come out exact. The backend stores amounts as plain JSON numbers or
//! strings; `Decimal`'s deserializer accepts both.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A non-negative monetary amount in the marketplace currency.
///
/// Negative amounts are representable (subtraction is occasionally needed
/// for rollback bookkeeping) but listings validate `>= 0` at the store
/// boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price from a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is negative (invalid for listings).
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// The extended amount for `quantity` units at this price.
    #[must_use]
    pub fn line_total(&self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Price {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn price(s: &str) -> Price {
        s.parse().unwrap()
    }

    #[test]
    fn test_line_total_exact() {
        // 2 x 2.99 + 4 x 0.75 = 8.98, exactly
        let total = price("2.99").line_total(2) + price("0.75").line_total(4);
        assert_eq!(total, price("8.98"));
    }

    #[test]
    fn test_sum() {
        let total: Price = [price("1.49"), price("2.99"), price("0.52")]
            .into_iter()
            .sum();
        assert_eq!(total, price("5.00"));
    }

    #[test]
    fn test_is_negative() {
        assert!(price("-0.01").is_negative());
        assert!(!Price::ZERO.is_negative());
        assert!(!price("2.99").is_negative());
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let from_number: Price = serde_json::from_str("2.99").unwrap();
        let from_string: Price = serde_json::from_str("\"2.99\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, price("2.99"));
    }
}
