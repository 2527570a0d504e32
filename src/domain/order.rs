use crate::domain::counter::{CounterDelta, CounterKey};
use crate::domain::history::{StatusHistory, StatusHistoryEntry};
use crate::domain::lifecycle::{
    LifecycleStatus, Party, Plan, check_transition, non_blank, party_of, require_vendor,
};
use crate::domain::money::Amount;
use crate::domain::notification::{Related, RelatedType};
use crate::domain::payment::{Payable, PaymentFlow, PaymentInfo, ensure_cancellable};
use crate::domain::ports::{Filter, Record, RecordMeta};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PaymentSubmitted,
    PaymentConfirmed,
    PaymentRejected,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PaymentSubmitted => "payment_submitted",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::PaymentRejected => "payment_rejected",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl LifecycleStatus for OrderStatus {
    fn next_states(self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            Pending => &[PaymentSubmitted, Cancelled],
            PaymentSubmitted => &[PaymentSubmitted, PaymentConfirmed, PaymentRejected, Cancelled],
            PaymentRejected => &[PaymentSubmitted, Cancelled],
            PaymentConfirmed => &[Processing],
            Processing => &[Shipped],
            Shipped => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }
}

impl PaymentFlow for OrderStatus {
    const SUBMITTED: Self = Self::PaymentSubmitted;
    const CONFIRMED: Self = Self::PaymentConfirmed;
    const REJECTED: Self = Self::PaymentRejected;
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        use OrderStatus::*;
        [
            Pending,
            PaymentSubmitted,
            PaymentConfirmed,
            PaymentRejected,
            Processing,
            Shipped,
            Delivered,
            Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str() == s.trim())
        .ok_or_else(|| MarketError::ValidationError(format!("unknown order status: {s}")))
    }
}

/// Price snapshot of one product at the time the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Amount,
}

impl LineItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Amount,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> Amount {
        self.unit_price * self.quantity
    }
}

/// Checkout request from the customer app.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: String,
    pub vendor_id: String,
    pub items: Vec<LineItem>,
    pub payment_method: Option<String>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    /// Validates the request and returns the order total.
    pub fn validate(&self) -> Result<Amount> {
        if self.customer_id.trim().is_empty() || self.vendor_id.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "customer and vendor are required".into(),
            ));
        }
        if self.customer_id == self.vendor_id {
            return Err(MarketError::ValidationError(
                "a vendor cannot order from themselves".into(),
            ));
        }
        if let Some(item) = self
            .items
            .iter()
            .find(|item| item.quantity == 0 || item.product_id.trim().is_empty())
        {
            return Err(MarketError::ValidationError(format!(
                "invalid line item for product '{}'",
                item.product_id
            )));
        }
        Amount::total(self.items.iter().map(LineItem::subtotal))
            .ok_or_else(|| MarketError::ValidationError("an order needs at least one item".into()))
    }

    /// Stock reserved when the order is placed.
    pub fn reservation(&self) -> Vec<CounterDelta> {
        self.items
            .iter()
            .map(|item| {
                CounterDelta::new(
                    CounterKey::stock(&item.product_id),
                    -Decimal::from(item.quantity),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Display label only, see `domain::number`.
    pub order_number: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub items: Vec<LineItem>,
    /// Fixed at creation; never recomputed from `items`.
    pub total_amount: Amount,
    pub payment: PaymentInfo,
    pub status: OrderStatus,
    pub status_history: StatusHistory<OrderStatus>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderUpdate {
    /// Appends to the ledger and moves `status` with it.
    Transition(StatusHistoryEntry<OrderStatus>),
    Receipt {
        url: String,
        method: String,
        submitted_at: DateTime<Utc>,
    },
    PaymentVerified {
        by: String,
        at: DateTime<Utc>,
    },
}

impl Order {
    pub fn place(
        request: NewOrder,
        order_number: String,
        total_amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        let entry = StatusHistoryEntry::new(
            OrderStatus::Pending,
            now,
            request.customer_id.as_str(),
            Some("Order placed".to_string()),
        );
        Self {
            meta: RecordMeta::default(),
            order_number,
            customer_id: request.customer_id,
            vendor_id: request.vendor_id,
            items: request.items,
            total_amount,
            payment: PaymentInfo::with_method(non_blank(request.payment_method.as_deref())),
            status: OrderStatus::Pending,
            status_history: StatusHistory::starting_with(entry),
            shipping_address: non_blank(request.shipping_address.as_deref()),
            notes: non_blank(request.notes.as_deref()),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn involves(&self, party_id: &str) -> bool {
        self.customer_id == party_id || self.vendor_id == party_id
    }

    /// Orders where `party_id` is the customer or the vendor.
    pub fn for_party(party_id: impl Into<String>) -> Filter<Order> {
        let party_id = party_id.into();
        Filter::new(move |order: &Order| order.involves(&party_id))
    }

    /// Validates a fulfilment step or a cancellation.
    ///
    /// Payment states are reached through the payment planners only.
    pub fn plan_status_change(
        &self,
        to: OrderStatus,
        actor_id: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Plan<OrderUpdate>> {
        let party = party_of(actor_id, &self.customer_id, &self.vendor_id)?;
        match to {
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered => {
                require_vendor(actor_id, &self.vendor_id)?;
            }
            OrderStatus::Cancelled => ensure_cancellable(&self.payment)?,
            OrderStatus::Pending
            | OrderStatus::PaymentSubmitted
            | OrderStatus::PaymentConfirmed
            | OrderStatus::PaymentRejected => {
                return Err(MarketError::InvalidTransition(format!(
                    "{to} is reached through the payment workflow, not a status update"
                )));
            }
        }
        check_transition(self.status, to)?;

        let notes = non_blank(notes).or_else(|| match (to, party) {
            (OrderStatus::Cancelled, Party::Customer) => Some("Cancelled by customer".into()),
            (OrderStatus::Cancelled, Party::Vendor) => Some("Cancelled by vendor".into()),
            _ => None,
        });
        let entry = StatusHistoryEntry::new(to, now, actor_id, notes);
        Ok(Plan::apply(vec![OrderUpdate::Transition(entry)]).with_counters(self.side_effects(to)))
    }

    /// Counter deltas committed together with a move to `to`.
    ///
    /// Stock was reserved at creation, so cancelling gives it back and
    /// delivery only books the sale.
    pub fn side_effects(&self, to: OrderStatus) -> Vec<CounterDelta> {
        match to {
            OrderStatus::Cancelled => self
                .items
                .iter()
                .map(|item| {
                    CounterDelta::new(CounterKey::stock(&item.product_id), item.quantity)
                })
                .collect(),
            OrderStatus::Delivered => {
                let mut deltas: Vec<CounterDelta> = self
                    .items
                    .iter()
                    .map(|item| {
                        CounterDelta::new(
                            CounterKey::ProductSold {
                                product_id: item.product_id.clone(),
                            },
                            item.quantity,
                        )
                    })
                    .collect();
                deltas.push(CounterDelta::new(
                    CounterKey::VendorTotalSales {
                        vendor_id: self.vendor_id.clone(),
                    },
                    1,
                ));
                deltas.push(CounterDelta::new(
                    CounterKey::VendorTotalRevenue {
                        vendor_id: self.vendor_id.clone(),
                    },
                    self.total_amount.value(),
                ));
                deltas
            }
            _ => Vec::new(),
        }
    }
}

impl Record for Order {
    const COLLECTION: &'static str = "orders";
    const ENTITY: &'static str = "order";
    type Update = OrderUpdate;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn apply(&mut self, update: OrderUpdate) {
        match update {
            OrderUpdate::Transition(entry) => {
                self.status = entry.status;
                self.updated_at = entry.timestamp;
                if entry.status == OrderStatus::Delivered {
                    self.completed_at = Some(entry.timestamp);
                }
                self.status_history.append(entry);
            }
            OrderUpdate::Receipt {
                url,
                method,
                submitted_at,
            } => {
                self.payment.receipt_url = Some(url);
                self.payment.method = Some(method);
                self.payment.submitted_at = Some(submitted_at);
                self.updated_at = submitted_at;
            }
            OrderUpdate::PaymentVerified { by, at } => {
                self.payment.verified = true;
                self.payment.verified_by = Some(by);
                self.payment.verified_at = Some(at);
                self.updated_at = at;
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.order_number.clone())
    }
}

impl Payable for Order {
    type Status = OrderStatus;

    fn status(&self) -> OrderStatus {
        self.status
    }

    fn payment(&self) -> &PaymentInfo {
        &self.payment
    }

    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    fn amount_due(&self) -> Amount {
        self.total_amount
    }

    fn related(&self) -> Related {
        Related {
            id: self.meta.id.clone(),
            number: self.order_number.clone(),
            kind: RelatedType::Order,
        }
    }

    fn transition(entry: StatusHistoryEntry<OrderStatus>) -> OrderUpdate {
        OrderUpdate::Transition(entry)
    }

    fn receipt(url: String, method: String, submitted_at: DateTime<Utc>) -> OrderUpdate {
        OrderUpdate::Receipt {
            url,
            method,
            submitted_at,
        }
    }

    fn verified(by: String, at: DateTime<Utc>) -> OrderUpdate {
        OrderUpdate::PaymentVerified { by, at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{plan_receipt, plan_rejection, plan_verification};
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        let request = NewOrder {
            customer_id: "cust".into(),
            vendor_id: "vend".into(),
            items: vec![
                LineItem::new("p1", "Lamp", 1, Amount::new(dec!(40000)).unwrap()),
                LineItem::new("p2", "Bulb", 1, Amount::new(dec!(5999)).unwrap()),
            ],
            payment_method: Some("bank_transfer".into()),
            shipping_address: None,
            notes: None,
        };
        let total = request.validate().unwrap();
        Order::place(request, "ORD-20260101-123456".into(), total, Utc::now())
    }

    fn run(order: &mut Order, plan: Plan<OrderUpdate>) {
        if let Plan::Apply { updates, .. } = plan {
            for update in updates {
                order.apply(update);
            }
        }
    }

    #[test]
    fn test_new_order_total_and_validation() {
        let order = sample_order();
        assert_eq!(order.total_amount.value(), dec!(45999));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.current_status(), Some(order.status));

        let empty = NewOrder {
            customer_id: "c".into(),
            vendor_id: "v".into(),
            items: vec![],
            payment_method: None,
            shipping_address: None,
            notes: None,
        };
        assert!(matches!(
            empty.validate(),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_adjacency_has_no_skips() {
        assert!(OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::PaymentRejected.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [OrderStatus::Pending, OrderStatus::PaymentRejected, OrderStatus::Shipped] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("teleported".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_full_payment_and_fulfilment_walk() {
        let mut order = sample_order();
        let now = Utc::now();

        let plan = plan_receipt(&order, "cust", "https://r/1.png", "bank_transfer", now).unwrap();
        run(&mut order, plan);
        assert_eq!(order.status, OrderStatus::PaymentSubmitted);

        let plan = plan_verification(&order, "vend", true, None, now).unwrap();
        run(&mut order, plan);
        assert!(order.payment.verified);
        assert_eq!(order.payment.verified_by.as_deref(), Some("vend"));

        for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            let plan = order.plan_status_change(next, "vend", None, now).unwrap();
            run(&mut order, plan);
            assert_eq!(order.status_history.current_status(), Some(order.status));
        }
        assert!(order.completed_at.is_some());
        assert_eq!(order.status_history.len(), 6);
    }

    #[test]
    fn test_same_receipt_twice_is_a_no_op() {
        let mut order = sample_order();
        let now = Utc::now();
        let plan = plan_receipt(&order, "cust", "https://r/1.png", "bank_transfer", now).unwrap();
        run(&mut order, plan);

        let again = plan_receipt(&order, "cust", "https://r/1.png", "bank_transfer", now).unwrap();
        assert!(matches!(again, Plan::Unchanged));

        let replaced =
            plan_receipt(&order, "cust", "https://r/2.png", "bank_transfer", now).unwrap();
        run(&mut order, replaced);
        assert_eq!(order.payment.receipt_url.as_deref(), Some("https://r/2.png"));
        assert_eq!(order.status_history.len(), 3);
    }

    #[test]
    fn test_receipt_requires_url_and_customer() {
        let order = sample_order();
        let now = Utc::now();
        assert!(matches!(
            plan_receipt(&order, "cust", "  ", "bank_transfer", now),
            Err(MarketError::ValidationError(_))
        ));
        assert!(matches!(
            plan_receipt(&order, "vend", "https://r/1.png", "bank_transfer", now),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_verification_requires_attestation_and_vendor() {
        let mut order = sample_order();
        let now = Utc::now();
        let plan = plan_receipt(&order, "cust", "https://r/1.png", "gcash", now).unwrap();
        run(&mut order, plan);

        assert!(matches!(
            plan_verification(&order, "vend", false, None, now),
            Err(MarketError::InvalidTransition(_))
        ));
        assert!(matches!(
            plan_verification(&order, "cust", true, None, now),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_rejection_then_resubmission_skips_pending() {
        let mut order = sample_order();
        let now = Utc::now();
        let plan = plan_receipt(&order, "cust", "https://r/1.png", "gcash", now).unwrap();
        run(&mut order, plan);

        assert!(matches!(
            plan_rejection(&order, "vend", "   ", now),
            Err(MarketError::ValidationError(_))
        ));
        let plan = plan_rejection(&order, "vend", "amount mismatch", now).unwrap();
        run(&mut order, plan);
        assert_eq!(order.status, OrderStatus::PaymentRejected);
        assert_eq!(
            order.status_history.last().unwrap().notes.as_deref(),
            Some("amount mismatch")
        );

        let plan = plan_receipt(&order, "cust", "https://r/2.png", "gcash", now).unwrap();
        run(&mut order, plan);
        assert_eq!(order.status, OrderStatus::PaymentSubmitted);
    }

    #[test]
    fn test_cancel_after_verification_is_refused() {
        let mut order = sample_order();
        let now = Utc::now();
        let plan = plan_receipt(&order, "cust", "https://r/1.png", "gcash", now).unwrap();
        run(&mut order, plan);
        let plan = plan_verification(&order, "vend", true, None, now).unwrap();
        run(&mut order, plan);

        for actor in ["cust", "vend"] {
            assert!(matches!(
                order.plan_status_change(OrderStatus::Cancelled, actor, None, now),
                Err(MarketError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn test_payment_states_not_reachable_by_status_update() {
        let order = sample_order();
        assert!(matches!(
            order.plan_status_change(OrderStatus::PaymentConfirmed, "vend", None, Utc::now()),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cancellation_releases_reserved_stock() {
        let order = sample_order();
        let plan = order
            .plan_status_change(OrderStatus::Cancelled, "cust", None, Utc::now())
            .unwrap();
        let Plan::Apply { counters, .. } = plan else {
            panic!("expected a cancellation to apply");
        };
        assert_eq!(counters.len(), 2);
        assert!(counters.iter().all(|delta| delta.delta == dec!(1)));
    }
}
