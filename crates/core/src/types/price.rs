//! Non-negative decimal price.
//!
//! Prices are stored as JSON numbers so that persisted carts stay readable by
//! any client. Internally they are `Decimal` to keep totals exact.

use core::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a number.
    #[error("price is not a number: {0}")]
    Invalid(String),
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
}

/// A non-negative amount in the store currency's standard unit.
///
/// ```
/// use nogalim_core::Price;
///
/// let price: Price = " 120.50 ".parse().unwrap();
/// assert_eq!(price.to_string(), "120.50");
/// assert!("-1".parse::<Price>().is_err());
/// assert!("abc".parse::<Price>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(Decimal);

impl Price {
    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(amount))
    }

    /// Create a price from a whole number of currency units.
    #[must_use]
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount in minor units (hundredths), rounded half away from zero.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let amount = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| PriceError::Invalid(s.to_string()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = rust_decimal::serde::float::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_numeric_strings() {
        assert_eq!("100".parse::<Price>().unwrap(), Price::from_units(100));
        assert_eq!(" 50 ".parse::<Price>().unwrap(), Price::from_units(50));
        assert_eq!(
            "19.99".parse::<Price>().unwrap().amount(),
            Decimal::new(1999, 2)
        );
    }

    #[test]
    fn test_parse_rejects_garbage_and_negatives() {
        assert!(matches!("".parse::<Price>(), Err(PriceError::Invalid(_))));
        assert!(matches!(
            "ten".parse::<Price>(),
            Err(PriceError::Invalid(_))
        ));
        assert_eq!("-0.01".parse::<Price>(), Err(PriceError::Negative));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Price::from_units(100).minor_units(), Some(10_000));
        assert_eq!("12.345".parse::<Price>().unwrap().minor_units(), Some(1235));
    }

    #[test]
    fn test_minor_units_out_of_range() {
        let huge: Price = serde_json::from_str("1e27").unwrap();
        assert_eq!(huge.minor_units(), None);

        let past_i64: Price = "1e17".parse().unwrap();
        assert_eq!(past_i64.minor_units(), None);
    }

    #[test]
    fn test_serializes_as_json_number() {
        let json = serde_json::to_value(Price::from_units(100)).unwrap();
        assert!(json.is_number());
        assert_eq!(json.as_f64(), Some(100.0));
    }

    #[test]
    fn test_deserializes_integers_and_floats() {
        let whole: Price = serde_json::from_str("250").unwrap();
        assert_eq!(whole, Price::from_units(250));

        let fractional: Price = serde_json::from_str("9.5").unwrap();
        assert_eq!(fractional.amount(), Decimal::new(95, 1));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Price>("-3").is_err());
    }
}
