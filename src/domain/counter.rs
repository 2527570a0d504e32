use crate::error::{MarketError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A numeric field shared by concurrent writers.
///
/// Each variant pairs a subject with one of its fields, so an update to a
/// field the subject does not have cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum CounterKey {
    ProductStock { product_id: String },
    ProductViews { product_id: String },
    ProductSold { product_id: String },
    VendorTotalSales { vendor_id: String },
    VendorTotalRevenue { vendor_id: String },
    ServiceTotalBookings { service_id: String },
    ChatUnread { chat_id: String, user_id: String },
    /// Bumped on every booking acceptance; guards the vendor's calendar.
    VendorScheduleRevision { vendor_id: String },
    /// Bumped on every stored rating; guards the rating recompute.
    VendorReviewRevision { vendor_id: String },
}

impl CounterKey {
    pub fn stock(product_id: impl Into<String>) -> Self {
        Self::ProductStock {
            product_id: product_id.into(),
        }
    }

    pub fn unread(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::ChatUnread {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Flat key used by the persistent backends.
    pub fn storage_key(&self) -> String {
        match self {
            Self::ProductStock { product_id } => format!("product/{product_id}/total_stock"),
            Self::ProductViews { product_id } => format!("product/{product_id}/views"),
            Self::ProductSold { product_id } => format!("product/{product_id}/sold"),
            Self::VendorTotalSales { vendor_id } => format!("vendor/{vendor_id}/total_sales"),
            Self::VendorTotalRevenue { vendor_id } => format!("vendor/{vendor_id}/total_revenue"),
            Self::ServiceTotalBookings { service_id } => {
                format!("service/{service_id}/total_bookings")
            }
            Self::ChatUnread { chat_id, user_id } => format!("chat/{chat_id}/unread/{user_id}"),
            Self::VendorScheduleRevision { vendor_id } => {
                format!("vendor/{vendor_id}/schedule_revision")
            }
            Self::VendorReviewRevision { vendor_id } => {
                format!("vendor/{vendor_id}/review_revision")
            }
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// A signed change to one counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub key: CounterKey,
    pub delta: Decimal,
    /// When set, the delta only applies if the counter still holds this
    /// value; otherwise the whole batch fails with `Conflict`.
    pub expect: Option<Decimal>,
}

impl CounterDelta {
    pub fn new(key: CounterKey, delta: impl Into<Decimal>) -> Self {
        Self {
            key,
            delta: delta.into(),
            expect: None,
        }
    }

    pub fn expecting(mut self, current: Decimal) -> Self {
        self.expect = Some(current);
        self
    }
}

/// Computes the values a batch of deltas would produce.
///
/// `current` reads the stored value (zero when absent). Deltas on the same key
/// accumulate in order. Counters never go below zero: a batch that would push
/// any key negative fails with `ValidationError` and nothing is returned to
/// write. Stores call this under their write lock and persist the result only
/// on success, which makes a batch all-or-nothing.
pub fn fold_deltas<F>(deltas: &[CounterDelta], mut current: F) -> Result<Vec<(CounterKey, Decimal)>>
where
    F: FnMut(&CounterKey) -> Result<Decimal>,
{
    let mut staged: HashMap<CounterKey, Decimal> = HashMap::new();
    let mut order: Vec<CounterKey> = Vec::new();

    for delta in deltas {
        let value = match staged.get(&delta.key) {
            Some(value) => *value,
            None => {
                order.push(delta.key.clone());
                current(&delta.key)?
            }
        };

        if let Some(expected) = delta.expect
            && expected != value
        {
            return Err(MarketError::Conflict(format!(
                "{} moved from {expected} to {value}",
                delta.key
            )));
        }

        let next = value + delta.delta;
        if next < Decimal::ZERO {
            return Err(MarketError::ValidationError(format!(
                "{} would drop below zero ({value} + {})",
                delta.key, delta.delta
            )));
        }
        staged.insert(delta.key.clone(), next);
    }

    Ok(order
        .into_iter()
        .map(|key| {
            let value = staged[&key];
            (key, value)
        })
        .collect())
}

/// A vendor's average review score, always recomputed from every review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRating {
    pub rating: Decimal,
    pub total_reviews: u32,
}

impl VendorRating {
    /// Mean of all scores rounded half-up to one decimal place.
    pub fn from_scores(scores: &[u8]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let sum: Decimal = scores.iter().map(|score| Decimal::from(*score)).sum();
        let count = Decimal::from(scores.len() as u64);
        let rating =
            (sum / count).round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        Some(Self {
            rating,
            total_reviews: scores.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table(values: &[(CounterKey, Decimal)]) -> HashMap<CounterKey, Decimal> {
        values.iter().cloned().collect()
    }

    #[test]
    fn test_fold_accumulates_same_key() {
        let stock = CounterKey::stock("p1");
        let current = table(&[(stock.clone(), dec!(5))]);
        let result = fold_deltas(
            &[
                CounterDelta::new(stock.clone(), dec!(-2)),
                CounterDelta::new(stock.clone(), dec!(-1)),
            ],
            |key| Ok(current.get(key).copied().unwrap_or_default()),
        )
        .unwrap();
        assert_eq!(result, vec![(stock, dec!(2))]);
    }

    #[test]
    fn test_fold_rejects_negative_results() {
        let stock = CounterKey::stock("p1");
        let result = fold_deltas(&[CounterDelta::new(stock, dec!(-1))], |_| Ok(Decimal::ZERO));
        assert!(matches!(result, Err(MarketError::ValidationError(_))));
    }

    #[test]
    fn test_fold_checks_expectations() {
        let key = CounterKey::VendorScheduleRevision {
            vendor_id: "v1".into(),
        };
        let result = fold_deltas(
            &[CounterDelta::new(key.clone(), dec!(1)).expecting(dec!(3))],
            |_| Ok(dec!(4)),
        );
        assert!(matches!(result, Err(MarketError::Conflict(_))));

        let result = fold_deltas(
            &[CounterDelta::new(key.clone(), dec!(1)).expecting(dec!(4))],
            |_| Ok(dec!(4)),
        )
        .unwrap();
        assert_eq!(result, vec![(key, dec!(5))]);
    }

    #[test]
    fn test_rating_recompute_rounds_half_up() {
        let rating = VendorRating::from_scores(&[5, 4, 3]).unwrap();
        assert_eq!(rating.rating, dec!(4.0));
        assert_eq!(rating.total_reviews, 3);

        // 13 / 4 = 3.25, half-up gives 3.3 (half-even would give 3.2)
        let rating = VendorRating::from_scores(&[5, 4, 3, 1]).unwrap();
        assert_eq!(rating.rating, dec!(3.3));
        assert_eq!(rating.total_reviews, 4);
    }

    #[test]
    fn test_rating_of_no_reviews() {
        assert!(VendorRating::from_scores(&[]).is_none());
    }

    #[test]
    fn test_storage_keys_are_distinct_per_field() {
        let views = CounterKey::ProductViews {
            product_id: "p1".into(),
        };
        assert_ne!(CounterKey::stock("p1").storage_key(), views.storage_key());
        assert_eq!(
            CounterKey::unread("c1", "u1").storage_key(),
            "chat/c1/unread/u1"
        );
    }
}
