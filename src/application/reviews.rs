use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::counter::{CounterDelta, CounterKey, VendorRating};
use crate::domain::lifecycle::{non_blank, require_customer};
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{ClockRef, CounterStoreRef, StoreRef};
use crate::domain::review::Review;
use crate::error::{MarketError, Result};

/// Customer reviews and the vendor rating derived from them.
#[derive(Clone)]
pub struct ReviewService {
    reviews: StoreRef<Review>,
    orders: StoreRef<Order>,
    bookings: StoreRef<Booking>,
    counters: CounterStoreRef,
    clock: ClockRef,
    max_commit_attempts: u32,
}

impl ReviewService {
    pub fn new(
        reviews: StoreRef<Review>,
        orders: StoreRef<Order>,
        bookings: StoreRef<Booking>,
        counters: CounterStoreRef,
        clock: ClockRef,
        max_commit_attempts: u32,
    ) -> Self {
        Self {
            reviews,
            orders,
            bookings,
            counters,
            clock,
            max_commit_attempts,
        }
    }

    /// Reviews a delivered order or completed booking, then recomputes the
    /// vendor's rating from all of their reviews.
    pub async fn submit_review(
        &self,
        customer_id: &str,
        related_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Review> {
        let vendor_id = self.reviewable_vendor(customer_id, related_id).await?;
        let review = Review::new(
            &vendor_id,
            customer_id,
            related_id,
            rating,
            non_blank(comment),
            self.clock.now(),
        )?;
        let review = match self.reviews.create(review, Vec::new()).await {
            Err(MarketError::Conflict(_)) => {
                return Err(MarketError::ValidationError(format!(
                    "{related_id} has already been reviewed"
                )));
            }
            other => other?,
        };

        let updated = self.recompute_rating(&vendor_id).await?;
        tracing::info!(
            vendor = %vendor_id,
            rating = ?updated.map(|r| r.rating),
            "review recorded"
        );
        Ok(review)
    }

    /// Full recompute; never an incremental average.
    ///
    /// The rating is only written if no other recompute for the vendor
    /// landed since the reviews were read, so a recompute over fewer
    /// reviews can never overwrite a newer one.
    pub async fn recompute_rating(&self, vendor_id: &str) -> Result<Option<VendorRating>> {
        let guard = CounterKey::VendorReviewRevision {
            vendor_id: vendor_id.to_string(),
        };
        for attempt in 1..=self.max_commit_attempts {
            let revision = self.counters.value(&guard).await?;
            let scores: Vec<u8> = self
                .reviews
                .query(&Review::for_vendor(vendor_id))
                .await?
                .iter()
                .map(|review| review.rating)
                .collect();
            let Some(rating) = VendorRating::from_scores(&scores) else {
                return Ok(None);
            };
            let bump = CounterDelta::new(guard.clone(), 1).expecting(revision);
            match self.counters.store_rating(vendor_id, rating, vec![bump]).await {
                Ok(()) => return Ok(Some(rating)),
                Err(MarketError::Conflict(reason)) => {
                    tracing::debug!(vendor = vendor_id, attempt, %reason, "rating recompute raced");
                }
                Err(err) => return Err(err),
            }
        }
        Err(MarketError::StoreUnavailable(format!(
            "rating of vendor {vendor_id} kept changing underneath {} attempts",
            self.max_commit_attempts
        )))
    }

    pub async fn vendor_rating(&self, vendor_id: &str) -> Result<Option<VendorRating>> {
        self.counters.rating(vendor_id).await
    }

    pub async fn reviews_for(&self, vendor_id: &str) -> Result<Vec<Review>> {
        self.reviews.query(&Review::for_vendor(vendor_id)).await
    }

    async fn reviewable_vendor(&self, customer_id: &str, related_id: &str) -> Result<String> {
        if let Some(order) = self.orders.get(related_id).await? {
            require_customer(customer_id, &order.customer_id)?;
            if order.status != OrderStatus::Delivered {
                return Err(MarketError::InvalidTransition(format!(
                    "order {} is {} and cannot be reviewed until delivered",
                    order.order_number, order.status
                )));
            }
            return Ok(order.vendor_id);
        }
        if let Some(booking) = self.bookings.get(related_id).await? {
            require_customer(customer_id, &booking.customer_id)?;
            if booking.status != BookingStatus::Completed {
                return Err(MarketError::InvalidTransition(format!(
                    "booking {} is {} and cannot be reviewed until completed",
                    booking.booking_number, booking.status
                )));
            }
            return Ok(booking.vendor_id);
        }
        Err(MarketError::not_found("order or booking", related_id))
    }
}
