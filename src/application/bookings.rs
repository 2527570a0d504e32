use crate::application::notifications::NotificationDispatcher;
use crate::application::payment::PaymentWorkflow;
use crate::application::transition::{
    Attempt, Outcome, commit_plan, exhausted, load, run_transition,
};
use crate::config::LifecycleConfig;
use crate::domain::booking::{Booking, BookingStatus, NewBooking};
use crate::domain::counter::{CounterDelta, CounterKey};
use crate::domain::notification::LifecycleEvent;
use crate::domain::number;
use crate::domain::payment::Payable;
use crate::domain::ports::{ClockRef, CounterStoreRef, Filter, StoreRef, Subscription};
use crate::error::{MarketError, Result};
use std::sync::Arc;

/// Entry point for service bookings: request, vendor decision, payment and
/// service delivery.
#[derive(Clone)]
pub struct BookingService {
    store: StoreRef<Booking>,
    counters: CounterStoreRef,
    payments: PaymentWorkflow<Booking>,
    notifier: NotificationDispatcher,
    clock: ClockRef,
    config: Arc<LifecycleConfig>,
}

impl BookingService {
    pub fn new(
        store: StoreRef<Booking>,
        counters: CounterStoreRef,
        notifier: NotificationDispatcher,
        clock: ClockRef,
        config: Arc<LifecycleConfig>,
    ) -> Self {
        let payments = PaymentWorkflow::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            config.max_commit_attempts,
        );
        Self {
            store,
            counters,
            payments,
            notifier,
            clock,
            config,
        }
    }

    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking> {
        request.validate()?;
        let now = self.clock.now();

        let mut created = None;
        for _ in 0..self.config.max_number_attempts {
            let booking_number = number::generate(
                &self.config.booking_number_prefix,
                now,
                &mut rand::thread_rng(),
            );
            let booking = Booking::request(
                request.clone(),
                booking_number,
                self.config.default_booking_minutes,
                now,
            );
            match self.store.create(booking, Vec::new()).await {
                Ok(booking) => {
                    created = Some(booking);
                    break;
                }
                Err(MarketError::Conflict(reason)) => {
                    tracing::debug!(%reason, "booking number taken, drawing another");
                }
                Err(err) => return Err(err),
            }
        }
        let booking = created.ok_or_else(|| {
            MarketError::StoreUnavailable(format!(
                "no free booking number after {} attempts",
                self.config.max_number_attempts
            ))
        })?;

        tracing::info!(
            booking_id = %booking.meta.id,
            booking_number = %booking.booking_number,
            customer = %booking.customer_id,
            vendor = %booking.vendor_id,
            slot = %booking.starts_at(),
            "booking requested"
        );
        self.notifier.notify(LifecycleEvent::BookingRequested {
            booking: booking.related(),
            vendor_id: booking.vendor_id.clone(),
            service_name: booking.service_name.clone(),
        });
        Ok(booking)
    }

    /// Vendor accepts the booking if its slot is still free.
    ///
    /// The vendor's schedule revision is read before the overlap check and
    /// bumped in the same commit with an expectation on the value read, so of
    /// two concurrent accepts for overlapping slots only one can land; the
    /// other re-reads, sees the clash and fails.
    pub async fn accept_booking(
        &self,
        booking_id: &str,
        vendor_id: &str,
        notes: Option<&str>,
    ) -> Result<Booking> {
        let now = self.clock.now();
        for _ in 0..self.config.max_commit_attempts {
            let current = load(self.store.as_ref(), booking_id).await?;
            let schedule = CounterKey::VendorScheduleRevision {
                vendor_id: current.vendor_id.clone(),
            };
            let revision = self.counters.value(&schedule).await?;
            let holding = self
                .store
                .query(&Booking::holding_slot_for(&current.vendor_id))
                .await?;

            let plan = current
                .plan_accept(vendor_id, &holding, notes, now)?
                .with_counters(vec![CounterDelta::new(schedule, 1).expecting(revision)]);
            if let Attempt::Done(outcome) = commit_plan(self.store.as_ref(), current, plan).await? {
                let booking = outcome.into_record();
                tracing::info!(
                    booking_id,
                    actor = vendor_id,
                    slot = %booking.starts_at(),
                    "booking accepted"
                );
                self.notifier.notify(LifecycleEvent::BookingAccepted {
                    booking: booking.related(),
                    customer_id: booking.customer_id.clone(),
                    service_name: booking.service_name.clone(),
                });
                return Ok(booking);
            }
        }
        Err(exhausted::<Booking>(booking_id, self.config.max_commit_attempts))
    }

    pub async fn decline_booking(
        &self,
        booking_id: &str,
        vendor_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking> {
        let now = self.clock.now();
        let outcome = run_transition(
            self.store.as_ref(),
            booking_id,
            self.config.max_commit_attempts,
            |booking: &Booking| booking.plan_decline(vendor_id, reason, now),
        )
        .await?;

        if let Outcome::Committed(booking) = &outcome {
            tracing::info!(booking_id, actor = vendor_id, "booking declined");
            self.notifier.notify(LifecycleEvent::BookingDeclined {
                booking: booking.related(),
                customer_id: booking.customer_id.clone(),
                reason: reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
            });
        }
        Ok(outcome.into_record())
    }

    pub async fn submit_payment_receipt(
        &self,
        booking_id: &str,
        customer_id: &str,
        receipt_url: &str,
        method: &str,
    ) -> Result<Booking> {
        self.payments
            .submit_receipt(booking_id, customer_id, receipt_url, method)
            .await
    }

    pub async fn verify_payment(
        &self,
        booking_id: &str,
        vendor_id: &str,
        attested: bool,
        notes: Option<&str>,
    ) -> Result<Booking> {
        self.payments
            .verify(booking_id, vendor_id, attested, notes)
            .await
    }

    pub async fn reject_payment(
        &self,
        booking_id: &str,
        vendor_id: &str,
        reason: &str,
    ) -> Result<Booking> {
        self.payments.reject(booking_id, vendor_id, reason).await
    }

    /// Starts or completes the service, or cancels the booking.
    pub async fn update_booking_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
        actor_id: &str,
        notes: Option<&str>,
    ) -> Result<Booking> {
        let now = self.clock.now();
        let outcome = run_transition(
            self.store.as_ref(),
            booking_id,
            self.config.max_commit_attempts,
            |booking: &Booking| booking.plan_status_change(status, actor_id, notes, now),
        )
        .await?;

        if let Outcome::Committed(booking) = &outcome {
            tracing::info!(booking_id, %status, actor = actor_id, "booking status changed");
            self.notifier.notify(LifecycleEvent::BookingStatusChanged {
                booking: booking.related(),
                customer_id: booking.customer_id.clone(),
                vendor_id: booking.vendor_id.clone(),
                actor_id: actor_id.to_string(),
                status,
            });
        }
        Ok(outcome.into_record())
    }

    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking> {
        self.update_booking_status(booking_id, BookingStatus::Cancelled, actor_id, reason)
            .await
    }

    pub async fn get_booking(&self, booking_id: &str) -> Result<Booking> {
        load(self.store.as_ref(), booking_id).await
    }

    pub async fn bookings_for(&self, party_id: &str) -> Result<Vec<Booking>> {
        self.store.query(&Booking::for_party(party_id)).await
    }

    pub async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.store.query(&Filter::all()).await
    }

    pub async fn observe_bookings(&self, party_id: &str) -> Result<Subscription<Booking>> {
        self.store.subscribe(Booking::for_party(party_id)).await
    }
}
