mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{CUSTOMER, VENDOR, booking_request, harness, harness_with_push, order_request};
use marketflow::domain::chat::Message;
use marketflow::domain::notification::{Notification, NotificationKind, RelatedType};
use marketflow::domain::order::{Order, OrderStatus};
use marketflow::domain::ports::{Clock, PushTransport};
use marketflow::error::{MarketError, Result};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Semaphore;

struct StalledPush(Semaphore);

#[async_trait]
impl PushTransport for StalledPush {
    async fn deliver(&self, _notification: &Notification) -> Result<()> {
        let _permit = self
            .0
            .acquire()
            .await
            .map_err(|err| MarketError::StoreUnavailable(err.to_string()))?;
        Ok(())
    }
}

async fn delivered_order(h: &common::Harness) -> Order {
    h.engine.counters.restock("lamp", 10).await.unwrap();
    let id = h
        .engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap()
        .meta
        .id;
    h.engine
        .orders
        .submit_payment_receipt(&id, CUSTOMER, "https://receipts/r.png", "bank_transfer")
        .await
        .unwrap();
    h.engine
        .orders
        .verify_payment(&id, VENDOR, true, None)
        .await
        .unwrap();
    for status in [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        h.engine
            .orders
            .update_order_status(&id, status, VENDOR, None)
            .await
            .unwrap();
    }
    h.engine.orders.get_order(&id).await.unwrap()
}

#[tokio::test]
async fn test_lifecycle_events_reach_the_other_party() {
    let h = harness();
    h.engine.counters.restock("lamp", 1).await.unwrap();
    let order = h
        .engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap();

    let vendor_inbox = h.inbox(VENDOR).await;
    assert_eq!(vendor_inbox.len(), 1);
    assert_eq!(vendor_inbox[0].kind, NotificationKind::Order);
    assert_eq!(vendor_inbox[0].related_id, order.meta.id);
    assert_eq!(vendor_inbox[0].related_type, RelatedType::Order);
    assert!(vendor_inbox[0].message.contains(&order.order_number));

    h.engine
        .orders
        .cancel_order(&order.meta.id, CUSTOMER, None)
        .await
        .unwrap();
    let vendor_inbox = h.inbox(VENDOR).await;
    assert_eq!(vendor_inbox.len(), 2);
    assert_eq!(vendor_inbox[0].title, "Order cancelled");
    assert_eq!(h.inbox(CUSTOMER).await.len(), 1);
    assert_eq!(
        h.engine.notifications.unread_count(CUSTOMER).await.unwrap(),
        1
    );

    assert_eq!(h.engine.notifications.mark_all_read(VENDOR).await.unwrap(), 2);
    assert_eq!(h.engine.notifications.unread_count(VENDOR).await.unwrap(), 0);
    assert_eq!(h.engine.notifications.mark_all_read(VENDOR).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stalled_push_does_not_hold_up_checkout() {
    let push = Arc::new(StalledPush(Semaphore::new(0)));
    let h = harness_with_push(push.clone());
    h.engine.counters.restock("lamp", 1).await.unwrap();

    let placed = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        h.engine
            .orders
            .create_order(order_request(vec![("lamp", 1, dec!(25))])),
    )
    .await
    .expect("checkout waited on the push transport")
    .unwrap();
    assert_eq!(placed.status, OrderStatus::Pending);

    push.0.add_permits(1);
    let inbox = h.inbox(VENDOR).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].related_id, placed.meta.id);
}

#[tokio::test]
async fn test_notifications_cannot_be_marked_by_someone_else() {
    let h = harness();
    h.engine
        .bookings
        .create_booking(booking_request(CUSTOMER, 6, 10, 0))
        .await
        .unwrap();
    let notification = h.inbox(VENDOR).await[0].clone();

    let err = h
        .engine
        .notifications
        .mark_read(&notification.meta.id, CUSTOMER)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::NotFound { .. }));

    let read = h
        .engine
        .notifications
        .mark_read(&notification.meta.id, VENDOR)
        .await
        .unwrap();
    assert!(read.is_read);
}

#[tokio::test]
async fn test_chat_unread_counts_follow_messages() {
    let h = harness();
    let chat = h.engine.chat.open_chat(CUSTOMER, VENDOR).await.unwrap();
    let same = h.engine.chat.open_chat(VENDOR, CUSTOMER).await.unwrap();
    assert_eq!(chat.meta.id, same.meta.id);
    let chat_id = chat.meta.id;

    h.engine
        .chat
        .send_message(&chat_id, CUSTOMER, "Ana", "Is the lamp still available?")
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    let long = "x".repeat(80);
    h.engine
        .chat
        .send_message(&chat_id, CUSTOMER, "Ana", &long)
        .await
        .unwrap();

    assert_eq!(h.engine.chat.unread_count(&chat_id, VENDOR).await.unwrap(), 2);
    assert_eq!(h.engine.chat.unread_count(&chat_id, CUSTOMER).await.unwrap(), 0);

    let chat = h.engine.chat.chats_for(VENDOR).await.unwrap().remove(0);
    assert_eq!(chat.last_message.unwrap().text, long);

    let inbox = h.inbox(VENDOR).await;
    assert_eq!(inbox[0].kind, NotificationKind::Message);
    assert_eq!(inbox[0].related_type, RelatedType::Chat);
    assert!(inbox[0].message.ends_with('…'));

    assert_eq!(h.engine.chat.mark_read(&chat_id, VENDOR).await.unwrap(), 2);
    assert_eq!(h.engine.chat.mark_read(&chat_id, VENDOR).await.unwrap(), 0);
    assert_eq!(h.engine.chat.unread_count(&chat_id, VENDOR).await.unwrap(), 0);
    assert!(
        h.engine
            .chat
            .messages(&chat_id)
            .await
            .unwrap()
            .iter()
            .all(|message: &Message| message.is_read)
    );
}

#[tokio::test]
async fn test_outsiders_cannot_post_or_open_self_chats() {
    let h = harness();
    let chat = h.engine.chat.open_chat(CUSTOMER, VENDOR).await.unwrap();

    let err = h
        .engine
        .chat
        .send_message(&chat.meta.id, "stranger", "Eve", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationError(_) | MarketError::InvalidTransition(_)));

    let err = h
        .engine
        .chat
        .send_message(&chat.meta.id, CUSTOMER, "Ana", "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationError(_)));

    assert!(h.engine.chat.open_chat(CUSTOMER, CUSTOMER).await.is_err());
}

#[tokio::test]
async fn test_rating_is_recomputed_from_every_review() {
    let h = harness();
    let mut order_ids = Vec::new();
    for _ in 0..4 {
        order_ids.push(delivered_order(&h).await.meta.id);
    }

    for (id, score) in order_ids.iter().zip([5u8, 4, 3]) {
        h.engine
            .reviews
            .submit_review(CUSTOMER, id, score, None)
            .await
            .unwrap();
    }
    let rating = h.engine.reviews.vendor_rating(VENDOR).await.unwrap().unwrap();
    assert_eq!(rating.rating, dec!(4.0));
    assert_eq!(rating.total_reviews, 3);

    h.engine
        .reviews
        .submit_review(CUSTOMER, &order_ids[3], 1, Some("arrived scratched"))
        .await
        .unwrap();
    let stats = h.engine.counters.vendor_stats(VENDOR).await.unwrap();
    let rating = stats.rating.unwrap();
    assert_eq!(rating.rating, dec!(3.3));
    assert_eq!(rating.total_reviews, 4);

    let err = h
        .engine
        .reviews
        .submit_review(CUSTOMER, &order_ids[0], 2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::ValidationError(_)));
    assert_eq!(h.engine.reviews.reviews_for(VENDOR).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_undelivered_order_cannot_be_reviewed() {
    let h = harness();
    h.engine.counters.restock("lamp", 1).await.unwrap();
    let order = h
        .engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap();

    let err = h
        .engine
        .reviews
        .submit_review(CUSTOMER, &order.meta.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition(_)));
    assert!(h.engine.reviews.vendor_rating(VENDOR).await.unwrap().is_none());
}

#[tokio::test]
async fn test_order_subscription_sees_snapshot_then_changes() {
    let h = harness();
    h.engine.counters.restock("lamp", 2).await.unwrap();
    let first = h
        .engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap();

    let mut subscription = h.engine.orders.observe_orders(VENDOR).await.unwrap();
    let snapshot = subscription.next().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].meta.id, first.meta.id);

    h.engine
        .orders
        .submit_payment_receipt(&first.meta.id, CUSTOMER, "https://receipts/s.png", "bank_transfer")
        .await
        .unwrap();
    let update = subscription.next().await.unwrap();
    assert_eq!(update[0].status, OrderStatus::PaymentSubmitted);

    h.engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap();
    let update = subscription.next().await.unwrap();
    assert_eq!(update.len(), 2);

    assert_eq!(h.store.subscriber_count::<Order>(), 1);
    subscription.cancel();
    assert_eq!(h.store.subscriber_count::<Order>(), 0);
}

#[tokio::test]
async fn test_monitor_reports_receipts_waiting_too_long() {
    let h = harness();
    h.engine.counters.restock("lamp", 1).await.unwrap();
    let order = h
        .engine
        .orders
        .create_order(order_request(vec![("lamp", 1, dec!(25))]))
        .await
        .unwrap();
    assert!(
        h.engine
            .monitor
            .oldest_unverified_payment_age(h.clock.now())
            .await
            .unwrap()
            .is_none()
    );

    h.engine
        .orders
        .submit_payment_receipt(&order.meta.id, CUSTOMER, "https://receipts/m.png", "bank_transfer")
        .await
        .unwrap();
    h.clock.advance(Duration::hours(3));
    let booking = h
        .engine
        .bookings
        .create_booking(booking_request(CUSTOMER, 7, 10, 0))
        .await
        .unwrap();
    h.engine
        .bookings
        .accept_booking(&booking.meta.id, VENDOR, None)
        .await
        .unwrap();
    h.engine
        .bookings
        .submit_payment_receipt(
            &booking.meta.id,
            CUSTOMER,
            "https://receipts/b.png",
            "bank_transfer",
        )
        .await
        .unwrap();

    h.clock.advance(Duration::hours(46));
    let now = h.clock.now();
    assert_eq!(
        h.engine
            .monitor
            .oldest_unverified_payment_age(now)
            .await
            .unwrap(),
        Some(Duration::hours(49))
    );
    assert_eq!(h.engine.monitor.pending_payments().await.unwrap().len(), 2);

    let stale = h.engine.monitor.stale_payments(now).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].related.id, order.meta.id);

    h.engine
        .orders
        .verify_payment(&order.meta.id, VENDOR, true, None)
        .await
        .unwrap();
    assert!(h.engine.monitor.stale_payments(now).await.unwrap().is_empty());
}
