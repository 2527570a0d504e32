//! Pieces shared by the order and booking state machines.

use crate::domain::counter::CounterDelta;
use crate::error::{MarketError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};

/// A status enum driven by a fixed adjacency list.
pub trait LifecycleStatus:
    Copy + Eq + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every status reachable in one step from `self`.
    fn next_states(self) -> &'static [Self];

    fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    fn can_transition_to(self, next: Self) -> bool {
        self.next_states().contains(&next)
    }
}

/// Fails with `InvalidTransition` unless `to` is adjacent to `from`.
pub fn check_transition<S: LifecycleStatus>(from: S, to: S) -> Result<()> {
    if from.is_terminal() {
        return Err(MarketError::InvalidTransition(format!(
            "{from} is terminal and accepts no further transitions"
        )));
    }
    if !from.can_transition_to(to) {
        return Err(MarketError::InvalidTransition(format!(
            "cannot move from {from} to {to}"
        )));
    }
    Ok(())
}

/// Which side of a transaction an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Customer,
    Vendor,
}

/// Identifies the role of `actor_id` on a record with the given parties.
pub fn party_of(actor_id: &str, customer_id: &str, vendor_id: &str) -> Result<Party> {
    if actor_id == vendor_id {
        Ok(Party::Vendor)
    } else if actor_id == customer_id {
        Ok(Party::Customer)
    } else {
        Err(MarketError::InvalidTransition(format!(
            "{actor_id} is not a party to this transaction"
        )))
    }
}

pub fn require_vendor(actor_id: &str, vendor_id: &str) -> Result<()> {
    if actor_id == vendor_id {
        Ok(())
    } else {
        Err(MarketError::InvalidTransition(format!(
            "only the vendor may do this, {actor_id} is not the vendor"
        )))
    }
}

pub fn require_customer(actor_id: &str, customer_id: &str) -> Result<()> {
    if actor_id == customer_id {
        Ok(())
    } else {
        Err(MarketError::InvalidTransition(format!(
            "only the customer may do this, {actor_id} is not the customer"
        )))
    }
}

/// Outcome of validating a transition against the current record.
#[derive(Debug, Clone)]
pub enum Plan<U> {
    /// The request is already satisfied; nothing is written.
    Unchanged,
    /// Updates and counter deltas to commit as one unit.
    Apply {
        updates: Vec<U>,
        counters: Vec<CounterDelta>,
    },
}

impl<U> Plan<U> {
    pub fn apply(updates: Vec<U>) -> Self {
        Self::Apply {
            updates,
            counters: Vec::new(),
        }
    }

    pub fn with_counters(self, extra: Vec<CounterDelta>) -> Self {
        match self {
            Self::Unchanged => Self::Unchanged,
            Self::Apply {
                updates,
                mut counters,
            } => {
                counters.extend(extra);
                Self::Apply { updates, counters }
            }
        }
    }
}

/// Trims free-text input, mapping blank strings to `None`.
pub fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_of() {
        assert_eq!(party_of("v", "c", "v").unwrap(), Party::Vendor);
        assert_eq!(party_of("c", "c", "v").unwrap(), Party::Customer);
        assert!(matches!(
            party_of("x", "c", "v"),
            Err(MarketError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ok ")), Some("ok".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
