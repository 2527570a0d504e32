use crate::domain::booking::Booking;
use crate::domain::money::Amount;
use crate::domain::notification::Related;
use crate::domain::order::Order;
use crate::domain::payment::{Payable, PaymentFlow};
use crate::domain::ports::{Filter, StoreRef};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};

/// A submitted receipt still waiting for the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    pub related: Related,
    pub customer_id: String,
    pub vendor_id: String,
    pub amount: Amount,
    pub submitted_at: DateTime<Utc>,
}

impl PendingPayment {
    fn from_record<P: Payable>(record: &P) -> Option<Self> {
        Some(Self {
            related: record.related(),
            customer_id: record.customer_id().to_string(),
            vendor_id: record.vendor_id().to_string(),
            amount: record.amount_due(),
            submitted_at: record.payment().submitted_at?,
        })
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.submitted_at
    }
}

fn awaiting_review<P: Payable>() -> Filter<P> {
    Filter::new(|record: &P| record.status() == P::Status::SUBMITTED && !record.payment().verified)
}

/// Reports how long receipts have been waiting for manual verification.
///
/// Transitions never time out; this is the hook an operator dashboard or
/// alert polls instead.
#[derive(Clone)]
pub struct PaymentMonitor {
    orders: StoreRef<Order>,
    bookings: StoreRef<Booking>,
    warn_after: Duration,
}

impl PaymentMonitor {
    pub fn new(orders: StoreRef<Order>, bookings: StoreRef<Booking>, warn_after: Duration) -> Self {
        Self {
            orders,
            bookings,
            warn_after,
        }
    }

    /// Every receipt awaiting review across orders and bookings, oldest first.
    pub fn warn_after(&self) -> Duration {
        self.warn_after
    }

    pub async fn pending_payments(&self) -> Result<Vec<PendingPayment>> {
        let orders = self.orders.query(&awaiting_review()).await?;
        let bookings = self.bookings.query(&awaiting_review()).await?;
        let mut pending: Vec<PendingPayment> = orders
            .iter()
            .filter_map(PendingPayment::from_record)
            .chain(bookings.iter().filter_map(PendingPayment::from_record))
            .collect();
        pending.sort_by_key(|payment| payment.submitted_at);
        Ok(pending)
    }

    pub async fn oldest_unverified_payment_age(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Duration>> {
        Ok(self
            .pending_payments()
            .await?
            .first()
            .map(|payment| payment.age(now)))
    }

    /// Receipts waiting longer than the configured threshold; each one is
    /// logged as a warning.
    pub async fn stale_payments(&self, now: DateTime<Utc>) -> Result<Vec<PendingPayment>> {
        let stale: Vec<PendingPayment> = self
            .pending_payments()
            .await?
            .into_iter()
            .filter(|payment| payment.age(now) >= self.warn_after)
            .collect();
        for payment in &stale {
            tracing::warn!(
                related = %payment.related,
                vendor = %payment.vendor_id,
                age_hours = payment.age(now).num_hours(),
                "payment receipt waiting for verification"
            );
        }
        Ok(stale)
    }
}
