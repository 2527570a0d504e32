//! The optimistic read-validate-commit loop every transition runs through.

use crate::domain::lifecycle::Plan;
use crate::domain::ports::{ChangeSet, Record, RecordStore};
use crate::error::{MarketError, Result};

/// What a transition did.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The request was already satisfied; the stored record is returned as is.
    Unchanged(T),
    Committed(T),
}

impl<T> Outcome<T> {
    pub fn record(&self) -> &T {
        match self {
            Self::Unchanged(record) | Self::Committed(record) => record,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            Self::Unchanged(record) | Self::Committed(record) => record,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

pub(crate) enum Attempt<T> {
    Done(Outcome<T>),
    /// Someone else committed first; re-read and plan again.
    Stale,
}

pub(crate) async fn load<T: Record>(store: &dyn RecordStore<T>, id: &str) -> Result<T> {
    store
        .get(id)
        .await?
        .ok_or_else(|| MarketError::not_found(T::ENTITY, id))
}

/// Commits `plan` against the revision `current` was read at.
pub(crate) async fn commit_plan<T: Record>(
    store: &dyn RecordStore<T>,
    current: T,
    plan: Plan<T::Update>,
) -> Result<Attempt<T>> {
    let (updates, counters) = match plan {
        Plan::Unchanged => return Ok(Attempt::Done(Outcome::Unchanged(current))),
        Plan::Apply { updates, counters } => (updates, counters),
    };
    let change = ChangeSet {
        expected_revision: current.revision(),
        updates,
        counters,
    };
    match store.commit(current.id(), change).await {
        Ok(record) => Ok(Attempt::Done(Outcome::Committed(record))),
        Err(MarketError::Conflict(reason)) => {
            tracing::debug!(
                entity = T::ENTITY,
                id = current.id(),
                %reason,
                "stale write, retrying"
            );
            Ok(Attempt::Stale)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn exhausted<T: Record>(id: &str, attempts: u32) -> MarketError {
    MarketError::StoreUnavailable(format!(
        "{} {id} kept changing underneath {attempts} commit attempts",
        T::ENTITY
    ))
}

/// Re-reads the record, plans against it and commits, retrying on stale
/// revisions up to `max_attempts` times.
pub(crate) async fn run_transition<T, F>(
    store: &dyn RecordStore<T>,
    id: &str,
    max_attempts: u32,
    mut plan: F,
) -> Result<Outcome<T>>
where
    T: Record,
    F: FnMut(&T) -> Result<Plan<T::Update>> + Send,
{
    for _ in 0..max_attempts {
        let current = load(store, id).await?;
        let next = plan(&current)?;
        if let Attempt::Done(outcome) = commit_plan(store, current, next).await? {
            return Ok(outcome);
        }
    }
    Err(exhausted::<T>(id, max_attempts))
}
