//! Storage module for ledger blocks, heads and pending records

pub mod cache;
pub mod persistence;

pub use cache::{write_record, Cache, MemoryCache, StorageError};
pub use persistence::{FileCache, StorageConfig};
