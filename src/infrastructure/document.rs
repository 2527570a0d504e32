//! JSON document handling shared by the store backends.

use crate::domain::counter::CounterDelta;
use crate::domain::ports::{ChangeSet, Filter, Record};
use crate::error::{MarketError, Result};
use serde_json::Value;
use uuid::Uuid;

pub(crate) fn encode<T: Record>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

pub(crate) fn decode<T: Record>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(value.clone())?)
}

/// Gives a new record its store identity.
pub(crate) fn stamp_new<T: Record>(record: &mut T, seq: u64) {
    let meta = record.meta_mut();
    meta.id = Uuid::new_v4().to_string();
    meta.seq = seq;
    meta.revision = 1;
}

/// Applies a change set to the stored version of a record.
///
/// Fails with `Conflict` when the caller planned against an older revision.
/// Returns the new version and the counter deltas still to be applied.
pub(crate) fn apply_change<T: Record>(
    mut current: T,
    change: ChangeSet<T>,
) -> Result<(T, Vec<CounterDelta>)> {
    if current.revision() != change.expected_revision {
        return Err(MarketError::Conflict(format!(
            "{} {} is at revision {}, change was planned against {}",
            T::ENTITY,
            current.id(),
            current.revision(),
            change.expected_revision
        )));
    }
    for update in change.updates {
        current.apply(update);
    }
    current.meta_mut().revision += 1;
    Ok((current, change.counters))
}

/// Decodes the documents (already in insertion order) that match `filter`.
pub(crate) fn select<'a, T: Record>(
    filter: &Filter<T>,
    docs: impl IntoIterator<Item = &'a Value>,
) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for doc in docs {
        let record: T = decode(doc)?;
        if filter.matches(&record) {
            rows.push(record);
        }
    }
    Ok(rows)
}

pub(crate) fn duplicate<T: Record>(key: &str) -> MarketError {
    MarketError::Conflict(format!("{} {key} already exists", T::ENTITY))
}
