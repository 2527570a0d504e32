use crate::domain::counter::{CounterDelta, CounterKey, VendorRating};
use crate::domain::ports::CounterStoreRef;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;

/// Dashboard figures for one vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorStats {
    pub total_sales: Decimal,
    pub total_revenue: Decimal,
    pub rating: Option<VendorRating>,
}

/// Atomic deltas on shared numeric fields.
///
/// Nothing here reads a value and writes it back; every change is a delta
/// the store applies under its own lock.
#[derive(Clone)]
pub struct CounterAggregator {
    counters: CounterStoreRef,
}

impl CounterAggregator {
    pub fn new(counters: CounterStoreRef) -> Self {
        Self { counters }
    }

    /// Applies one delta and returns the new value. Floored counters that
    /// would go negative fail with `ValidationError` and keep their value.
    pub async fn apply_delta(&self, key: CounterKey, delta: impl Into<Decimal>) -> Result<Decimal> {
        let applied = self
            .counters
            .apply(vec![CounterDelta::new(key.clone(), delta)])
            .await?;
        applied
            .into_iter()
            .find(|(applied_key, _)| *applied_key == key)
            .map(|(_, value)| value)
            .ok_or_else(|| {
                MarketError::StoreUnavailable(format!("{key} missing from batch result"))
            })
    }

    /// All-or-nothing batch.
    pub async fn apply_all(&self, deltas: Vec<CounterDelta>) -> Result<Vec<(CounterKey, Decimal)>> {
        self.counters.apply(deltas).await
    }

    pub async fn value(&self, key: &CounterKey) -> Result<Decimal> {
        self.counters.value(key).await
    }

    pub async fn record_product_view(&self, product_id: &str) -> Result<Decimal> {
        self.apply_delta(
            CounterKey::ProductViews {
                product_id: product_id.to_string(),
            },
            1,
        )
        .await
    }

    pub async fn restock(&self, product_id: &str, quantity: u32) -> Result<Decimal> {
        if quantity == 0 {
            return Err(MarketError::ValidationError(
                "restock quantity must be positive".into(),
            ));
        }
        let level = self
            .apply_delta(CounterKey::stock(product_id), quantity)
            .await?;
        tracing::info!(product_id, quantity, %level, "product restocked");
        Ok(level)
    }

    pub async fn stock_level(&self, product_id: &str) -> Result<Decimal> {
        self.value(&CounterKey::stock(product_id)).await
    }

    pub async fn vendor_stats(&self, vendor_id: &str) -> Result<VendorStats> {
        Ok(VendorStats {
            total_sales: self
                .value(&CounterKey::VendorTotalSales {
                    vendor_id: vendor_id.to_string(),
                })
                .await?,
            total_revenue: self
                .value(&CounterKey::VendorTotalRevenue {
                    vendor_id: vendor_id.to_string(),
                })
                .await?,
            rating: self.counters.rating(vendor_id).await?,
        })
    }
}
