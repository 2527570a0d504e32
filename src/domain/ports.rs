use super::counter::{CounterDelta, CounterKey, VendorRating};
use super::notification::Notification;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

/// Store-managed identity of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Assigned by the store on create; the only real identity.
    #[serde(default)]
    pub id: String,
    /// Insertion sequence, used to order query results.
    #[serde(default)]
    pub seq: u64,
    /// Incremented by every commit; used for optimistic concurrency.
    #[serde(default)]
    pub revision: u64,
}

/// A document kept in one collection of the persistent store.
pub trait Record: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    const COLLECTION: &'static str;
    /// Singular name used in error messages.
    const ENTITY: &'static str;

    /// Typed field updates; the only way a stored record changes.
    type Update: Clone + Debug + Send + Sync + 'static;

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;
    fn apply(&mut self, update: Self::Update);

    /// Value the store keeps unique within the collection, if any.
    fn unique_key(&self) -> Option<String> {
        None
    }

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn revision(&self) -> u64 {
        self.meta().revision
    }
}

/// Row predicate for queries and subscriptions.
pub struct Filter<T>(Arc<dyn Fn(&T) -> bool + Send + Sync>);

impl<T> Filter<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn matches(&self, record: &T) -> bool {
        (self.0)(record)
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Everything one transition writes, applied as a single atomic unit.
#[derive(Debug, Clone)]
pub struct ChangeSet<T: Record> {
    /// Commit fails with `Conflict` if the stored revision differs.
    pub expected_revision: u64,
    pub updates: Vec<T::Update>,
    pub counters: Vec<CounterDelta>,
}

#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    /// Inserts `record` with a fresh id and applies `counters` in the same
    /// unit. Fails with `Conflict` if the record's unique key is taken.
    async fn create(&self, record: T, counters: Vec<CounterDelta>) -> Result<T>;
    async fn get(&self, id: &str) -> Result<Option<T>>;
    /// Matching records in insertion order.
    async fn query(&self, filter: &Filter<T>) -> Result<Vec<T>>;
    async fn commit(&self, id: &str, change: ChangeSet<T>) -> Result<T>;
    async fn subscribe(&self, filter: Filter<T>) -> Result<Subscription<T>>;
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Applies every delta or none of them; returns the new values in the
    /// order the keys first appear.
    async fn apply(&self, deltas: Vec<CounterDelta>) -> Result<Vec<(CounterKey, Decimal)>>;
    async fn value(&self, key: &CounterKey) -> Result<Decimal>;
    /// Writes the rating together with `deltas`, or neither when a delta
    /// fails.
    async fn store_rating(
        &self,
        vendor_id: &str,
        rating: VendorRating,
        deltas: Vec<CounterDelta>,
    ) -> Result<()>;
    async fn rating(&self, vendor_id: &str) -> Result<Option<VendorRating>>;
}

pub type StoreRef<T> = Arc<dyn RecordStore<T>>;
pub type CounterStoreRef = Arc<dyn CounterStore>;

/// Live view over a filtered collection.
///
/// The first `next()` yields the snapshot at subscription time; each later
/// call waits for the next commit to the collection. Cancelling (or dropping)
/// unregisters the listener immediately, after which nothing more is sent.
pub struct Subscription<T> {
    receiver: watch::Receiver<Vec<T>>,
    guard: CancelGuard,
    primed: bool,
}

struct CancelGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    pub fn new(
        receiver: watch::Receiver<Vec<T>>,
        on_cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            guard: CancelGuard(Some(Box::new(on_cancel))),
            primed: false,
        }
    }

    /// `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if self.primed {
            self.receiver.changed().await.ok()?;
        }
        self.primed = true;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn latest(&self) -> Vec<T> {
        self.receiver.borrow().clone()
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<T>> + Send + Unpin {
        let guard = self.guard;
        WatchStream::new(self.receiver).map(move |snapshot| {
            let _keep_alive = &guard;
            snapshot
        })
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockRef = Arc<dyn Clock>;

/// Delivers stored notifications to devices. Delivery itself lives outside
/// the engine.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}
