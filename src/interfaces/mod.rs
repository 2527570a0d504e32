//! Replay CLI surface: CSV commands in, order and booking summaries out.

pub mod csv;
pub mod replay;
