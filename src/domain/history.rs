use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable line of the audit trail attached to an order or booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry<S> {
    pub status: S,
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub notes: Option<String>,
}

impl<S> StatusHistoryEntry<S> {
    pub fn new(
        status: S,
        timestamp: DateTime<Utc>,
        actor_id: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            status,
            timestamp,
            actor_id: actor_id.into(),
            notes,
        }
    }
}

/// Append-only status ledger.
///
/// `append` is the only mutator. Entries are kept in insertion order and
/// timestamps never decrease along the list, so ordering by timestamp with
/// insertion order as the tie-break is the same as list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHistory<S> {
    entries: Vec<StatusHistoryEntry<S>>,
}

impl<S: Copy> StatusHistory<S> {
    pub fn starting_with(entry: StatusHistoryEntry<S>) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    pub fn append(&mut self, mut entry: StatusHistoryEntry<S>) {
        // A writer with a lagging clock must not reorder the trail.
        if let Some(last) = self.entries.last()
            && entry.timestamp < last.timestamp
        {
            entry.timestamp = last.timestamp;
        }
        self.entries.push(entry);
    }

    /// Status of the last entry; the record's `status` field must match it.
    pub fn current_status(&self) -> Option<S> {
        self.entries.last().map(|entry| entry.status)
    }

    pub fn last(&self) -> Option<&StatusHistoryEntry<S>> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[StatusHistoryEntry<S>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Light {
        Red,
        Green,
    }

    #[test]
    fn test_current_status_follows_last_append() {
        let t0 = Utc::now();
        let mut history =
            StatusHistory::starting_with(StatusHistoryEntry::new(Light::Red, t0, "a", None));
        assert_eq!(history.current_status(), Some(Light::Red));

        history.append(StatusHistoryEntry::new(Light::Green, t0 + Duration::seconds(1), "b", None));
        assert_eq!(history.current_status(), Some(Light::Green));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_append_never_moves_time_backwards() {
        let t0 = Utc::now();
        let mut history =
            StatusHistory::starting_with(StatusHistoryEntry::new(Light::Red, t0, "a", None));
        history.append(StatusHistoryEntry::new(
            Light::Green,
            t0 - Duration::minutes(5),
            "b",
            None,
        ));

        let entries = history.entries();
        assert_eq!(entries[1].timestamp, t0);
        assert_eq!(entries[1].status, Light::Green);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let t0 = Utc::now();
        let history =
            StatusHistory::starting_with(StatusHistoryEntry::new("pending", t0, "a", None));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["status"], "pending");
    }
}
