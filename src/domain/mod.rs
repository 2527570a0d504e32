//! Records, state machines and the ports the stores implement.

pub mod booking;
pub mod chat;
pub mod counter;
pub mod history;
pub mod lifecycle;
pub mod money;
pub mod notification;
pub mod number;
pub mod order;
pub mod payment;
pub mod ports;
pub mod review;
