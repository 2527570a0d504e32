use crate::application::notifications::NotificationDispatcher;
use crate::application::payment::PaymentWorkflow;
use crate::application::transition::{Outcome, load, run_transition};
use crate::config::LifecycleConfig;
use crate::domain::notification::LifecycleEvent;
use crate::domain::number;
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::payment::Payable;
use crate::domain::ports::{ClockRef, Filter, StoreRef, Subscription};
use crate::error::{MarketError, Result};
use std::sync::Arc;

/// Entry point for everything that happens to an order after checkout.
///
/// Every mutation re-reads the stored order, validates against the state
/// machine and commits with the revision it read; status, history and any
/// counter side effects land together or not at all.
#[derive(Clone)]
pub struct OrderService {
    store: StoreRef<Order>,
    payments: PaymentWorkflow<Order>,
    notifier: NotificationDispatcher,
    clock: ClockRef,
    config: Arc<LifecycleConfig>,
}

impl OrderService {
    pub fn new(
        store: StoreRef<Order>,
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
            payments,
            notifier,
            clock,
            config,
        }
    }

    /// Places an order in `Pending`, reserving stock for every line item in
    /// the same write.
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        let total = request.validate()?;
        let reservation = request.reservation();
        let now = self.clock.now();

        let mut placed = None;
        for _ in 0..self.config.max_number_attempts {
            let order_number = number::generate(
                &self.config.order_number_prefix,
                now,
                &mut rand::thread_rng(),
            );
            let order = Order::place(request.clone(), order_number, total, now);
            match self.store.create(order, reservation.clone()).await {
                Ok(order) => {
                    placed = Some(order);
                    break;
                }
                Err(MarketError::Conflict(reason)) => {
                    tracing::debug!(%reason, "order number taken, drawing another");
                }
                Err(err) => return Err(err),
            }
        }
        let order = placed.ok_or_else(|| {
            MarketError::StoreUnavailable(format!(
                "no free order number after {} attempts",
                self.config.max_number_attempts
            ))
        })?;

        tracing::info!(
            order_id = %order.meta.id,
            order_number = %order.order_number,
            customer = %order.customer_id,
            vendor = %order.vendor_id,
            total = %order.total_amount,
            "order placed"
        );
        self.notifier.notify(LifecycleEvent::OrderPlaced {
            order: order.related(),
            vendor_id: order.vendor_id.clone(),
            total: order.total_amount,
        });
        Ok(order)
    }

    pub async fn submit_payment_receipt(
        &self,
        order_id: &str,
        customer_id: &str,
        receipt_url: &str,
        method: &str,
    ) -> Result<Order> {
        self.payments
            .submit_receipt(order_id, customer_id, receipt_url, method)
            .await
    }

    pub async fn verify_payment(
        &self,
        order_id: &str,
        vendor_id: &str,
        attested: bool,
        notes: Option<&str>,
    ) -> Result<Order> {
        self.payments
            .verify(order_id, vendor_id, attested, notes)
            .await
    }

    pub async fn reject_payment(
        &self,
        order_id: &str,
        vendor_id: &str,
        reason: &str,
    ) -> Result<Order> {
        self.payments.reject(order_id, vendor_id, reason).await
    }

    /// Drives fulfilment (`Processing`, `Shipped`, `Delivered`) or
    /// cancellation. Payment states are only reachable through the payment
    /// operations.
    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        actor_id: &str,
        notes: Option<&str>,
    ) -> Result<Order> {
        let now = self.clock.now();
        let outcome = run_transition(
            self.store.as_ref(),
            order_id,
            self.config.max_commit_attempts,
            |order: &Order| order.plan_status_change(status, actor_id, notes, now),
        )
        .await?;

        if let Outcome::Committed(order) = &outcome {
            tracing::info!(order_id, %status, actor = actor_id, "order status changed");
            self.notifier.notify(LifecycleEvent::OrderStatusChanged {
                order: order.related(),
                customer_id: order.customer_id.clone(),
                vendor_id: order.vendor_id.clone(),
                actor_id: actor_id.to_string(),
                status,
            });
        }
        Ok(outcome.into_record())
    }

    pub async fn cancel_order(
        &self,
        order_id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Order> {
        self.update_order_status(order_id, OrderStatus::Cancelled, actor_id, reason)
            .await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        load(self.store.as_ref(), order_id).await
    }

    /// Orders where `party_id` is the customer or the vendor, oldest first.
    pub async fn orders_for(&self, party_id: &str) -> Result<Vec<Order>> {
        self.store.query(&Order::for_party(party_id)).await
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.store.query(&Filter::all()).await
    }

    /// Live list of the orders `party_id` takes part in.
    pub async fn observe_orders(&self, party_id: &str) -> Result<Subscription<Order>> {
        self.store.subscribe(Order::for_party(party_id)).await
    }
}
