use crate::domain::counter::{CounterDelta, CounterKey, VendorRating, fold_deltas};
use crate::domain::ports::{ChangeSet, CounterStore, Filter, Record, RecordStore, Subscription};
use crate::error::{MarketError, Result};
use crate::infrastructure::document::{apply_change, decode, duplicate, encode, select, stamp_new};
use crate::infrastructure::hub::SubscriptionHub;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collection {
    docs: HashMap<String, Value>,
    /// Ids in insertion order.
    order: Vec<String>,
    /// Unique key -> id.
    unique: HashMap<String, String>,
}

impl Collection {
    fn ordered(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|id| self.docs.get(id).cloned())
            .collect()
    }
}

#[derive(Default)]
struct State {
    collections: HashMap<&'static str, Collection>,
    counters: HashMap<CounterKey, Decimal>,
    ratings: HashMap<String, VendorRating>,
    last_seq: u64,
}

impl State {
    fn counter(&self, key: &CounterKey) -> Decimal {
        self.counters.get(key).copied().unwrap_or_default()
    }

    fn stage(&self, deltas: &[CounterDelta]) -> Result<Vec<(CounterKey, Decimal)>> {
        fold_deltas(deltas, |key| Ok(self.counter(key)))
    }
}

/// A thread-safe in-memory document and counter store.
///
/// Every collection and every counter lives behind one
/// `Arc<RwLock<State>>`, so a record write and its counter deltas are a
/// single critical section. Ideal for tests, demos and the CLI without
/// `--db-path`.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    hub: SubscriptionHub,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions on `T`'s collection.
    pub fn subscriber_count<T: Record>(&self) -> usize {
        self.hub.listener_count(T::COLLECTION)
    }

    fn publish(&self, collection: &'static str, docs: &Collection) {
        if self.hub.has_listeners(collection) {
            self.hub.publish(collection, &docs.ordered());
        }
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for InMemoryStore {
    async fn create(&self, mut record: T, counters: Vec<CounterDelta>) -> Result<T> {
        let mut state = self.state.write().await;

        let unique_key = record.unique_key();
        if let Some(key) = &unique_key
            && state
                .collections
                .get(T::COLLECTION)
                .is_some_and(|collection| collection.unique.contains_key(key))
        {
            return Err(duplicate::<T>(key));
        }
        let staged = state.stage(&counters)?;
        stamp_new(&mut record, state.last_seq + 1);
        let value = encode(&record)?;

        let state = &mut *state;
        state.last_seq += 1;
        state.counters.extend(staged);
        let collection = state.collections.entry(T::COLLECTION).or_default();
        let id = record.id().to_string();
        if let Some(key) = unique_key {
            collection.unique.insert(key, id.clone());
        }
        collection.order.push(id.clone());
        collection.docs.insert(id, value);
        self.publish(T::COLLECTION, collection);

        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<T>> {
        let state = self.state.read().await;
        state
            .collections
            .get(T::COLLECTION)
            .and_then(|collection| collection.docs.get(id))
            .map(decode::<T>)
            .transpose()
    }

    async fn query(&self, filter: &Filter<T>) -> Result<Vec<T>> {
        let state = self.state.read().await;
        match state.collections.get(T::COLLECTION) {
            Some(collection) => select(
                filter,
                collection
                    .order
                    .iter()
                    .filter_map(|id| collection.docs.get(id)),
            ),
            None => Ok(Vec::new()),
        }
    }

    async fn commit(&self, id: &str, change: ChangeSet<T>) -> Result<T> {
        let mut state = self.state.write().await;

        let current: T = state
            .collections
            .get(T::COLLECTION)
            .and_then(|collection| collection.docs.get(id))
            .map(decode::<T>)
            .transpose()?
            .ok_or_else(|| MarketError::not_found(T::ENTITY, id))?;
        let (updated, deltas) = apply_change(current, change)?;
        let staged = state.stage(&deltas)?;
        let value = encode(&updated)?;

        let state = &mut *state;
        state.counters.extend(staged);
        let collection = state.collections.entry(T::COLLECTION).or_default();
        collection.docs.insert(id.to_string(), value);
        self.publish(T::COLLECTION, collection);

        Ok(updated)
    }

    async fn subscribe(&self, filter: Filter<T>) -> Result<Subscription<T>> {
        // Commits publish under the write lock, so holding the read lock here
        // means no commit lands between the snapshot and the registration.
        let state = self.state.read().await;
        let snapshot = state
            .collections
            .get(T::COLLECTION)
            .map(Collection::ordered)
            .unwrap_or_default();
        self.hub.subscribe(filter, &snapshot)
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn apply(&self, deltas: Vec<CounterDelta>) -> Result<Vec<(CounterKey, Decimal)>> {
        let mut state = self.state.write().await;
        let staged = state.stage(&deltas)?;
        state.counters.extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn value(&self, key: &CounterKey) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state.counter(key))
    }

    async fn store_rating(
        &self,
        vendor_id: &str,
        rating: VendorRating,
        deltas: Vec<CounterDelta>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let staged = state.stage(&deltas)?;
        state.counters.extend(staged);
        state.ratings.insert(vendor_id.to_string(), rating);
        Ok(())
    }

    async fn rating(&self, vendor_id: &str) -> Result<Option<VendorRating>> {
        let state = self.state.read().await;
        Ok(state.ratings.get(vendor_id).copied())
    }
}
