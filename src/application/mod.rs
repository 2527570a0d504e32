//! Application layer orchestrating the lifecycle state machines.
//!
//! Each service re-reads the authoritative record, plans the transition with
//! the domain rules and commits it as one change set through the store
//! ports. Notifications go out after the commit and never affect its result.

pub mod bookings;
pub mod chat;
pub mod counters;
pub mod engine;
pub mod monitor;
pub mod notifications;
pub mod orders;
pub mod payment;
pub mod reviews;
pub mod transition;
