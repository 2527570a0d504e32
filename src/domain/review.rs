use crate::domain::ports::{Filter, Record, RecordMeta};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// A customer's review of a vendor for one completed order or booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub vendor_id: String,
    pub customer_id: String,
    /// Order or booking the review is for.
    pub related_id: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        vendor_id: &str,
        customer_id: &str,
        related_id: &str,
        rating: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !(1..=5).contains(&rating) {
            return Err(MarketError::ValidationError(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        Ok(Self {
            meta: RecordMeta::default(),
            vendor_id: vendor_id.to_string(),
            customer_id: customer_id.to_string(),
            related_id: related_id.to_string(),
            rating,
            comment,
            created_at: now,
        })
    }

    pub fn for_vendor(vendor_id: impl Into<String>) -> Filter<Review> {
        let vendor_id = vendor_id.into();
        Filter::new(move |review: &Review| review.vendor_id == vendor_id)
    }
}

impl Record for Review {
    const COLLECTION: &'static str = "reviews";
    const ENTITY: &'static str = "review";
    // Reviews are immutable once written.
    type Update = Infallible;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: Infallible) {
        match update {}
    }

    /// One review per customer per transaction.
    fn unique_key(&self) -> Option<String> {
        Some(format!("{}|{}", self.customer_id, self.related_id))
    }
}
