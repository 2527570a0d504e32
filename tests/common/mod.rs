#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use marketflow::application::engine::{MarketEngine, Stores};
use marketflow::config::LifecycleConfig;
use marketflow::domain::booking::NewBooking;
use marketflow::domain::money::Amount;
use marketflow::domain::notification::Notification;
use marketflow::domain::order::{LineItem, NewOrder};
use marketflow::domain::ports::PushTransport;
use marketflow::infrastructure::clock::ManualClock;
use marketflow::infrastructure::in_memory::InMemoryStore;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const CUSTOMER: &str = "cust-1";
pub const VENDOR: &str = "vend-1";

pub struct Harness {
    pub engine: MarketEngine,
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Notifications of `user_id` once every pending dispatch has landed.
    pub async fn inbox(&self, user_id: &str) -> Vec<Notification> {
        self.engine.notifications.settled().await;
        self.engine
            .notifications
            .notifications_for(user_id)
            .await
            .unwrap()
    }
}

pub fn harness() -> Harness {
    build(None)
}

pub fn harness_with_push(push: Arc<dyn PushTransport>) -> Harness {
    build(Some(push))
}

fn build(push: Option<Arc<dyn PushTransport>>) -> Harness {
    let store = InMemoryStore::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap(),
    ));
    let stores = Stores::shared(store.clone());
    let config = LifecycleConfig::default();
    let engine = match push {
        Some(push) => MarketEngine::with_push(stores, clock.clone(), config, push),
        None => MarketEngine::new(stores, clock.clone(), config),
    };
    Harness {
        engine,
        store,
        clock,
    }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn order_request(items: Vec<(&str, u32, Decimal)>) -> NewOrder {
    NewOrder {
        customer_id: CUSTOMER.into(),
        vendor_id: VENDOR.into(),
        items: items
            .into_iter()
            .map(|(product, quantity, price)| {
                LineItem::new(product, format!("Product {product}"), quantity, amount(price))
            })
            .collect(),
        payment_method: Some("bank_transfer".into()),
        shipping_address: Some("12 Harbour Road".into()),
        notes: None,
    }
}

pub fn booking_request(customer: &str, day: u32, hour: u32, minutes: u32) -> NewBooking {
    NewBooking {
        customer_id: customer.into(),
        vendor_id: VENDOR.into(),
        service_id: "svc-1".into(),
        service_name: "Deep tissue massage".into(),
        price: amount(Decimal::from(80)),
        scheduled_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
        scheduled_time: NaiveTime::from_hms_opt(hour, minutes, 0).unwrap(),
        duration_minutes: Some(60),
        payment_method: None,
        notes: None,
    }
}
