use crate::application::bookings::BookingService;
use crate::application::chat::ChatService;
use crate::application::counters::CounterAggregator;
use crate::application::monitor::PaymentMonitor;
use crate::application::notifications::NotificationDispatcher;
use crate::application::orders::OrderService;
use crate::application::reviews::ReviewService;
use crate::config::LifecycleConfig;
use crate::domain::booking::Booking;
use crate::domain::chat::{Chat, Message};
use crate::domain::notification::Notification;
use crate::domain::order::Order;
use crate::domain::ports::{
    ClockRef, CounterStore, CounterStoreRef, PushTransport, RecordStore, StoreRef,
};
use crate::domain::review::Review;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::in_memory::InMemoryStore;
use chrono::Duration;
use std::sync::Arc;

/// One handle per collection plus the counter store.
///
/// Usually every handle points at the same backend, which is what makes a
/// record write and its counter deltas a single atomic unit.
#[derive(Clone)]
pub struct Stores {
    pub orders: StoreRef<Order>,
    pub bookings: StoreRef<Booking>,
    pub notifications: StoreRef<Notification>,
    pub chats: StoreRef<Chat>,
    pub messages: StoreRef<Message>,
    pub reviews: StoreRef<Review>,
    pub counters: CounterStoreRef,
}

impl Stores {
    /// Serves every collection and the counters from `backend`.
    pub fn shared<B>(backend: B) -> Self
    where
        B: RecordStore<Order>
            + RecordStore<Booking>
            + RecordStore<Notification>
            + RecordStore<Chat>
            + RecordStore<Message>
            + RecordStore<Review>
            + CounterStore
            + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            orders: backend.clone(),
            bookings: backend.clone(),
            notifications: backend.clone(),
            chats: backend.clone(),
            messages: backend.clone(),
            reviews: backend.clone(),
            counters: backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::shared(InMemoryStore::new())
    }
}

/// The transaction lifecycle engine with all of its services wired to one
/// set of stores.
///
/// Services are cheap to clone and safe to use from many tasks at once.
#[derive(Clone)]
pub struct MarketEngine {
    pub orders: OrderService,
    pub bookings: BookingService,
    pub counters: CounterAggregator,
    pub reviews: ReviewService,
    pub chat: ChatService,
    pub notifications: NotificationDispatcher,
    pub monitor: PaymentMonitor,
    config: Arc<LifecycleConfig>,
}

impl MarketEngine {
    pub fn new(stores: Stores, clock: ClockRef, config: LifecycleConfig) -> Self {
        Self::assemble(stores, clock, config, None)
    }

    /// Like [`new`](Self::new), also pushing every stored notification.
    pub fn with_push(
        stores: Stores,
        clock: ClockRef,
        config: LifecycleConfig,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        Self::assemble(stores, clock, config, Some(push))
    }

    /// In-memory stores and the system clock.
    pub fn in_memory(config: LifecycleConfig) -> Self {
        Self::new(Stores::in_memory(), Arc::new(SystemClock), config)
    }

    fn assemble(
        stores: Stores,
        clock: ClockRef,
        config: LifecycleConfig,
        push: Option<Arc<dyn PushTransport>>,
    ) -> Self {
        let config = Arc::new(config);
        let warn_after = config.payment_review_warn_after().unwrap_or_else(|err| {
            let fallback = LifecycleConfig::default().payment_review_warn_after_hours;
            tracing::warn!(
                error = %err,
                fallback_hours = fallback,
                "ignoring payment review threshold"
            );
            Duration::hours(fallback)
        });
        let mut notifications = NotificationDispatcher::new(
            stores.notifications.clone(),
            clock.clone(),
            config.message_preview_chars,
            config.max_commit_attempts,
        );
        if let Some(push) = push {
            notifications = notifications.with_push(push);
        }

        Self {
            orders: OrderService::new(
                stores.orders.clone(),
                notifications.clone(),
                clock.clone(),
                config.clone(),
            ),
            bookings: BookingService::new(
                stores.bookings.clone(),
                stores.counters.clone(),
                notifications.clone(),
                clock.clone(),
                config.clone(),
            ),
            counters: CounterAggregator::new(stores.counters.clone()),
            reviews: ReviewService::new(
                stores.reviews.clone(),
                stores.orders.clone(),
                stores.bookings.clone(),
                stores.counters.clone(),
                clock.clone(),
                config.max_commit_attempts,
            ),
            chat: ChatService::new(
                stores.chats.clone(),
                stores.messages.clone(),
                stores.counters.clone(),
                notifications.clone(),
                clock,
                config.max_commit_attempts,
            ),
            monitor: PaymentMonitor::new(stores.orders, stores.bookings, warn_after),
            notifications,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_threshold_falls_back_to_default() {
        for hours in [i64::MAX, 9_000_000_000_000_000, -5] {
            let config = LifecycleConfig {
                payment_review_warn_after_hours: hours,
                ..LifecycleConfig::default()
            };
            let engine = MarketEngine::in_memory(config);
            assert_eq!(engine.monitor.warn_after(), Duration::hours(48));
        }
    }

    #[test]
    fn test_threshold_reaches_the_monitor() {
        let config = LifecycleConfig {
            payment_review_warn_after_hours: 6,
            ..LifecycleConfig::default()
        };
        let engine = MarketEngine::in_memory(config);
        assert_eq!(engine.monitor.warn_after(), Duration::hours(6));
    }
}
