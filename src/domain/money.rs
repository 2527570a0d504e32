use crate::error::MarketError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul};

/// A strictly positive monetary amount.
///
/// Wraps `rust_decimal::Decimal` so prices, totals and revenue deltas never
/// go through floating point. Line item prices are captured as `Amount`
/// snapshots when an order is placed and never re-read from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, MarketError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(MarketError::ValidationError(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Adds up a sequence of amounts; `None` when the sequence is empty.
    pub fn total<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
        amounts.into_iter().reduce(|acc, next| acc + next)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MarketError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

// Sums of positive amounts stay positive, so these never leave the domain.
impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Amount {
    type Output = Self;
    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(MarketError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_arithmetic() {
        let unit = Amount::new(dec!(12.50)).unwrap();
        assert_eq!((unit * 3).value(), dec!(37.50));
        assert_eq!((unit + unit).value(), dec!(25.00));
    }

    #[test]
    fn test_amount_sum_of_empty_is_none() {
        assert!(Amount::total(Vec::new()).is_none());
        let unit = Amount::new(dec!(2)).unwrap();
        assert_eq!(Amount::total([unit, unit, unit]).unwrap().value(), dec!(6));
    }

    #[test]
    fn test_amount_rejects_non_positive_on_deserialize() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"0\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"45999\"").unwrap();
        assert_eq!(parsed.value(), dec!(45999));
    }
}
