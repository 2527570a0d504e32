use crate::domain::ports::{Filter, Record, Subscription};
use crate::error::Result;
use crate::infrastructure::document::select;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type Listener = Box<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_collection: HashMap<&'static str, Vec<(u64, Listener)>>,
}

/// Fan-out of committed collection snapshots to live subscriptions.
///
/// Stores call [`publish`](Self::publish) while still holding their write
/// lock, so every subscriber sees snapshots in commit order.
#[derive(Default, Clone)]
pub struct SubscriptionHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `T`'s collection, primed with `snapshot`.
    pub fn subscribe<T: Record>(
        &self,
        filter: Filter<T>,
        snapshot: &[Value],
    ) -> Result<Subscription<T>> {
        let (sender, receiver) = watch::channel(select(&filter, snapshot)?);
        let listener: Listener = Box::new(move |docs: &[Value]| match select(&filter, docs) {
            Ok(rows) => {
                // Receiver gone means the subscription is being dropped.
                let _ = sender.send(rows);
            }
            Err(err) => {
                tracing::warn!(
                    collection = T::COLLECTION,
                    error = %err,
                    "dropping undecodable snapshot"
                );
            }
        });

        let id = {
            let mut listeners = self.lock();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners
                .by_collection
                .entry(T::COLLECTION)
                .or_default()
                .push((id, listener));
            id
        };

        let registry = Arc::clone(&self.listeners);
        Ok(Subscription::new(receiver, move || {
            let mut listeners = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entries) = listeners.by_collection.get_mut(T::COLLECTION) {
                entries.retain(|(entry_id, _)| *entry_id != id);
            }
        }))
    }

    pub fn has_listeners(&self, collection: &str) -> bool {
        self.listener_count(collection) > 0
    }

    pub fn listener_count(&self, collection: &str) -> usize {
        self.lock()
            .by_collection
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Sends the full, ordered collection to every listener of `collection`.
    pub fn publish(&self, collection: &str, docs: &[Value]) {
        let listeners = self.lock();
        if let Some(entries) = listeners.by_collection.get(collection) {
            for (_, listener) in entries {
                listener(docs);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
