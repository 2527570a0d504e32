use crate::application::transition::{Outcome, run_transition};
use crate::domain::lifecycle::Plan;
use crate::domain::notification::{LifecycleEvent, Notification, NotificationUpdate};
use crate::domain::ports::{ClockRef, PushTransport, Record, StoreRef, Subscription};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Turns lifecycle events into stored notifications.
///
/// Dispatch is best-effort: a failed write or push is logged and dropped so
/// it can never undo or fail the transition that caused it. Services hand
/// events to [`notify`](Self::notify), which returns before anything is
/// written.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: StoreRef<Notification>,
    push: Option<Arc<dyn PushTransport>>,
    clock: ClockRef,
    preview_chars: usize,
    max_commit_attempts: u32,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl NotificationDispatcher {
    pub fn new(
        store: StoreRef<Notification>,
        clock: ClockRef,
        preview_chars: usize,
        max_commit_attempts: u32,
    ) -> Self {
        Self {
            store,
            push: None,
            clock,
            preview_chars,
            max_commit_attempts,
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Hands every stored notification to `push` as well.
    pub fn with_push(mut self, push: Arc<dyn PushTransport>) -> Self {
        self.push = Some(push);
        self
    }

    /// Dispatches `event` on a background task. Must be called from within
    /// a Tokio runtime.
    pub fn notify(&self, event: LifecycleEvent) {
        let dispatcher = self.clone();
        let now = self.clock.now();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(async move {
            dispatcher.dispatch_at(event, now).await;
        });
    }

    /// Waits until every event handed to [`notify`](Self::notify) so far has
    /// been stored or dropped.
    pub async fn settled(&self) {
        loop {
            let mut batch = std::mem::take(
                &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                return;
            }
            while let Some(joined) = batch.join_next().await {
                if let Err(err) = joined {
                    tracing::warn!(error = %err, "notification task failed");
                }
            }
        }
    }

    /// Stores the notifications for `event`; returns the ones that made it.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Vec<Notification> {
        self.dispatch_at(event, self.clock.now()).await
    }

    async fn dispatch_at(&self, event: LifecycleEvent, now: DateTime<Utc>) -> Vec<Notification> {
        let mut stored = Vec::new();
        for draft in event.drafts(self.preview_chars) {
            let user_id = draft.user_id.clone();
            match self
                .store
                .create(Notification::from_draft(draft, now), Vec::new())
                .await
            {
                Ok(notification) => {
                    if let Some(push) = &self.push
                        && let Err(err) = push.deliver(&notification).await
                    {
                        tracing::warn!(
                            %user_id,
                            notification_id = %notification.meta.id,
                            error = %err,
                            "push delivery failed"
                        );
                    }
                    stored.push(notification);
                }
                Err(err) => {
                    tracing::warn!(%user_id, error = %err, "failed to store notification");
                }
            }
        }
        stored
    }

    /// A user's notifications, newest first.
    pub async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>> {
        let mut notifications = self.store.query(&Notification::for_user(user_id)).await?;
        // Background dispatches may land out of order.
        notifications.reverse();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .store
            .query(&Notification::unread_for(user_id))
            .await?
            .len())
    }

    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<Notification> {
        Ok(self.mark(notification_id, user_id).await?.into_record())
    }

    /// Marks every unread notification of `user_id`; returns how many flipped.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let unread = self.store.query(&Notification::unread_for(user_id)).await?;
        let mut flipped = 0;
        for notification in unread {
            if self.mark(&notification.meta.id, user_id).await?.is_committed() {
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn mark(&self, notification_id: &str, user_id: &str) -> Result<Outcome<Notification>> {
        run_transition(
            self.store.as_ref(),
            notification_id,
            self.max_commit_attempts,
            |notification: &Notification| {
                if notification.user_id != user_id {
                    return Err(MarketError::not_found(Notification::ENTITY, notification_id));
                }
                if notification.is_read {
                    Ok(Plan::Unchanged)
                } else {
                    Ok(Plan::apply(vec![NotificationUpdate::MarkRead]))
                }
            },
        )
        .await
    }

    pub async fn observe(&self, user_id: &str) -> Result<Subscription<Notification>> {
        self.store.subscribe(Notification::for_user(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::{Related, RelatedType};
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct FailingPush(AtomicUsize);

    #[async_trait]
    impl PushTransport for FailingPush {
        async fn deliver(&self, _notification: &Notification) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(MarketError::StoreUnavailable("push service down".into()))
        }
    }

    struct GatedPush(Semaphore);

    #[async_trait]
    impl PushTransport for GatedPush {
        async fn deliver(&self, _notification: &Notification) -> Result<()> {
            let _permit = self
                .0
                .acquire()
                .await
                .map_err(|err| MarketError::StoreUnavailable(err.to_string()))?;
            Ok(())
        }
    }

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(InMemoryStore::new()), Arc::new(SystemClock), 50, 3)
    }

    fn verified(customer: &str) -> LifecycleEvent {
        LifecycleEvent::PaymentVerified {
            related: Related {
                id: "o-1".into(),
                number: "ORD-20260314-111111".into(),
                kind: RelatedType::Order,
            },
            customer_id: customer.into(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_stores_and_counts_unread() {
        let dispatcher = dispatcher();
        dispatcher.dispatch(verified("cust")).await;
        dispatcher.dispatch(verified("cust")).await;

        assert_eq!(dispatcher.unread_count("cust").await.unwrap(), 2);
        assert_eq!(dispatcher.unread_count("vend").await.unwrap(), 0);

        let latest = &dispatcher.notifications_for("cust").await.unwrap()[0];
        dispatcher.mark_read(&latest.meta.id, "cust").await.unwrap();
        assert_eq!(dispatcher.unread_count("cust").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_is_scoped_to_owner() {
        let dispatcher = dispatcher();
        let stored = dispatcher.dispatch(verified("cust")).await;
        let result = dispatcher.mark_read(&stored[0].meta.id, "someone-else").await;
        assert!(matches!(result, Err(MarketError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let push = Arc::new(FailingPush(AtomicUsize::new(0)));
        let dispatcher = dispatcher().with_push(push.clone());

        let stored = dispatcher.dispatch(verified("cust")).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(push.0.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.unread_count("cust").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let dispatcher = dispatcher();
        for _ in 0..3 {
            dispatcher.dispatch(verified("cust")).await;
        }
        assert_eq!(dispatcher.mark_all_read("cust").await.unwrap(), 3);
        assert_eq!(dispatcher.unread_count("cust").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_returns_before_delivery() {
        let push = Arc::new(GatedPush(Semaphore::new(0)));
        let dispatcher = dispatcher().with_push(push.clone());

        dispatcher.notify(verified("cust"));
        dispatcher.notify(verified("cust"));
        push.0.add_permits(2);
        dispatcher.settled().await;

        assert_eq!(dispatcher.unread_count("cust").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_settled_with_nothing_in_flight() {
        let dispatcher = dispatcher();
        dispatcher.settled().await;
        assert!(dispatcher.notifications_for("cust").await.unwrap().is_empty());
    }
}
