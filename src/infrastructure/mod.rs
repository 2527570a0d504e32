//! Store backends and other adapters for the domain ports.

pub mod clock;
pub(crate) mod document;
pub mod hub;
pub mod in_memory;
pub mod push;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
