use crate::application::notifications::NotificationDispatcher;
use crate::application::transition::{Outcome, run_transition};
use crate::domain::notification::LifecycleEvent;
use crate::domain::payment::{Payable, plan_receipt, plan_rejection, plan_verification};
use crate::domain::ports::{ClockRef, StoreRef};
use crate::error::Result;

/// Receipt submission, verification and rejection for one kind of payable
/// record. Orders and bookings each own one.
#[derive(Clone)]
pub struct PaymentWorkflow<P: Payable> {
    store: StoreRef<P>,
    notifier: NotificationDispatcher,
    clock: ClockRef,
    max_commit_attempts: u32,
}

impl<P: Payable> PaymentWorkflow<P> {
    pub fn new(
        store: StoreRef<P>,
        notifier: NotificationDispatcher,
        clock: ClockRef,
        max_commit_attempts: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            max_commit_attempts,
        }
    }

    pub async fn submit_receipt(
        &self,
        id: &str,
        customer_id: &str,
        receipt_url: &str,
        method: &str,
    ) -> Result<P> {
        let now = self.clock.now();
        let outcome = run_transition(self.store.as_ref(), id, self.max_commit_attempts, |record| {
            plan_receipt(record, customer_id, receipt_url, method, now)
        })
        .await?;

        match &outcome {
            Outcome::Committed(record) => {
                tracing::info!(
                    entity = P::ENTITY,
                    id,
                    actor = customer_id,
                    "payment receipt submitted"
                );
                self.notifier.notify(LifecycleEvent::ReceiptSubmitted {
                    related: record.related(),
                    vendor_id: record.vendor_id().to_string(),
                });
            }
            Outcome::Unchanged(_) => {
                tracing::debug!(entity = P::ENTITY, id, "receipt already on file");
            }
        }
        Ok(outcome.into_record())
    }

    /// Confirms the payment. Repeating the call after success returns the
    /// record unchanged.
    pub async fn verify(
        &self,
        id: &str,
        vendor_id: &str,
        attested: bool,
        notes: Option<&str>,
    ) -> Result<P> {
        let now = self.clock.now();
        let outcome = run_transition(self.store.as_ref(), id, self.max_commit_attempts, |record| {
            plan_verification(record, vendor_id, attested, notes, now)
        })
        .await?;

        match &outcome {
            Outcome::Committed(record) => {
                tracing::info!(entity = P::ENTITY, id, actor = vendor_id, "payment verified");
                self.notifier.notify(LifecycleEvent::PaymentVerified {
                    related: record.related(),
                    customer_id: record.customer_id().to_string(),
                });
            }
            Outcome::Unchanged(_) => {
                tracing::debug!(entity = P::ENTITY, id, "payment already verified");
            }
        }
        Ok(outcome.into_record())
    }

    pub async fn reject(&self, id: &str, vendor_id: &str, reason: &str) -> Result<P> {
        let now = self.clock.now();
        let outcome = run_transition(self.store.as_ref(), id, self.max_commit_attempts, |record| {
            plan_rejection(record, vendor_id, reason, now)
        })
        .await?;

        if let Outcome::Committed(record) = &outcome {
            tracing::info!(entity = P::ENTITY, id, actor = vendor_id, %reason, "payment rejected");
            self.notifier.notify(LifecycleEvent::PaymentRejected {
                related: record.related(),
                customer_id: record.customer_id().to_string(),
                reason: reason.trim().to_string(),
            });
        }
        Ok(outcome.into_record())
    }
}
