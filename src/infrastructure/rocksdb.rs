use crate::domain::counter::{CounterDelta, CounterKey, VendorRating, fold_deltas};
use crate::domain::ports::{ChangeSet, CounterStore, Filter, Record, RecordStore, Subscription};
use crate::error::{MarketError, Result};
use crate::infrastructure::document::{apply_change, decode, duplicate, encode, select, stamp_new};
use crate::infrastructure::hub::SubscriptionHub;
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family holding every record, keyed `{collection}/{id}`.
pub const CF_RECORDS: &str = "records";
/// Column Family holding counter values, keyed by `CounterKey::storage_key`.
pub const CF_COUNTERS: &str = "counters";
/// Column Family for unique-key indexes, vendor ratings and the sequence.
pub const CF_META: &str = "meta";

const SEQ_KEY: &[u8] = b"seq";

/// A persistent store implementation using RocksDB.
///
/// Records are JSON documents in one column family; counters and indexes
/// live in their own. Every write goes through a single `WriteBatch` taken
/// under `write_lock`, which makes record updates and counter deltas one
/// atomic unit and serialises the read-validate-write sequence.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
    hub: SubscriptionHub,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_RECORDS, CF_COUNTERS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
            hub: SubscriptionHub::new(),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::StoreUnavailable(format!("column family {name} not found")))
    }

    fn record_key(collection: &str, id: &str) -> String {
        format!("{collection}/{id}")
    }

    fn unique_key(collection: &str, key: &str) -> String {
        format!("unique/{collection}/{key}")
    }

    fn rating_key(vendor_id: &str) -> String {
        format!("rating/{vendor_id}")
    }

    fn read_doc(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let bytes = self
            .db
            .get_cf(self.cf(CF_RECORDS)?, Self::record_key(collection, id))?;
        bytes
            .map(|bytes| serde_json::from_slice(&bytes).map_err(MarketError::from))
            .transpose()
    }

    /// Every document of `collection` in insertion order.
    fn scan(&self, collection: &str) -> Result<Vec<Value>> {
        let prefix = format!("{collection}/");
        let iter = self.db.iterator_cf(
            self.cf(CF_RECORDS)?,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );

        let mut docs: Vec<(u64, Value)> = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let doc: Value = serde_json::from_slice(&value)?;
            let seq = doc.get("seq").and_then(Value::as_u64).unwrap_or_default();
            docs.push((seq, doc));
        }
        docs.sort_by_key(|(seq, _)| *seq);
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    fn read_counter(&self, key: &CounterKey) -> Result<Decimal> {
        match self.db.get_cf(self.cf(CF_COUNTERS)?, key.storage_key())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Decimal::ZERO),
        }
    }

    fn last_seq(&self) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_META)?, SEQ_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    MarketError::StoreUnavailable("corrupt sequence counter".into())
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn stage_counters(
        &self,
        batch: &mut WriteBatch,
        deltas: &[CounterDelta],
    ) -> Result<Vec<(CounterKey, Decimal)>> {
        let staged = fold_deltas(deltas, |key| self.read_counter(key))?;
        let cf = self.cf(CF_COUNTERS)?;
        for (key, value) in &staged {
            batch.put_cf(cf, key.storage_key(), serde_json::to_vec(value)?);
        }
        Ok(staged)
    }

    fn publish(&self, collection: &'static str) -> Result<()> {
        if self.hub.has_listeners(collection) {
            self.hub.publish(collection, &self.scan(collection)?);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for RocksDBStore {
    async fn create(&self, mut record: T, counters: Vec<CounterDelta>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let meta_cf = self.cf(CF_META)?;

        let unique_key = record.unique_key();
        if let Some(key) = &unique_key
            && self
                .db
                .get_pinned_cf(meta_cf, Self::unique_key(T::COLLECTION, key))?
                .is_some()
        {
            return Err(duplicate::<T>(key));
        }

        let mut batch = WriteBatch::default();
        self.stage_counters(&mut batch, &counters)?;

        let seq = self.last_seq()? + 1;
        stamp_new(&mut record, seq);
        batch.put_cf(meta_cf, SEQ_KEY, seq.to_be_bytes());
        if let Some(key) = &unique_key {
            batch.put_cf(meta_cf, Self::unique_key(T::COLLECTION, key), record.id());
        }
        batch.put_cf(
            self.cf(CF_RECORDS)?,
            Self::record_key(T::COLLECTION, record.id()),
            serde_json::to_vec(&encode(&record)?)?,
        );
        self.db.write(batch)?;

        self.publish(T::COLLECTION)?;
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<T>> {
        self.read_doc(T::COLLECTION, id)?
            .as_ref()
            .map(decode::<T>)
            .transpose()
    }

    async fn query(&self, filter: &Filter<T>) -> Result<Vec<T>> {
        select(filter, &self.scan(T::COLLECTION)?)
    }

    async fn commit(&self, id: &str, change: ChangeSet<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let current: T = self
            .read_doc(T::COLLECTION, id)?
            .as_ref()
            .map(decode::<T>)
            .transpose()?
            .ok_or_else(|| MarketError::not_found(T::ENTITY, id))?;
        let (updated, deltas) = apply_change(current, change)?;

        let mut batch = WriteBatch::default();
        self.stage_counters(&mut batch, &deltas)?;
        batch.put_cf(
            self.cf(CF_RECORDS)?,
            Self::record_key(T::COLLECTION, id),
            serde_json::to_vec(&encode(&updated)?)?,
        );
        self.db.write(batch)?;

        self.publish(T::COLLECTION)?;
        Ok(updated)
    }

    async fn subscribe(&self, filter: Filter<T>) -> Result<Subscription<T>> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.scan(T::COLLECTION)?;
        self.hub.subscribe(filter, &snapshot)
    }
}

#[async_trait]
impl CounterStore for RocksDBStore {
    async fn apply(&self, deltas: Vec<CounterDelta>) -> Result<Vec<(CounterKey, Decimal)>> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        let staged = self.stage_counters(&mut batch, &deltas)?;
        self.db.write(batch)?;
        Ok(staged)
    }

    async fn value(&self, key: &CounterKey) -> Result<Decimal> {
        self.read_counter(key)
    }

    async fn store_rating(
        &self,
        vendor_id: &str,
        rating: VendorRating,
        deltas: Vec<CounterDelta>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.stage_counters(&mut batch, &deltas)?;
        batch.put_cf(
            self.cf(CF_META)?,
            Self::rating_key(vendor_id),
            serde_json::to_vec(&rating)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn rating(&self, vendor_id: &str) -> Result<Option<VendorRating>> {
        match self.db.get_cf(self.cf(CF_META)?, Self::rating_key(vendor_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
