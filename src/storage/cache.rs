//! Content-addressed ledger store
//!
//! The [`Cache`] trait is the single handle through which every component
//! reads and mutates ledger state: blocks by hash, channel heads, and the
//! queue of record entries waiting to be mined into a channel.

use crate::core::{Block, BlockEntry, Record, Reference};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("Corrupt record {record}: {reason}")]
    CorruptRecord { record: String, reason: String },
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Block, head and pending-entry storage shared by a node
pub trait Cache: Send + Sync {
    /// Get the head reference of a channel
    fn get_head(&self, channel: &str) -> Result<Option<Reference>, StorageError>;

    /// Set the head reference of a channel
    fn put_head(&self, channel: &str, reference: &Reference) -> Result<(), StorageError>;

    /// Get a block by hash
    fn get_block(&self, hash: &[u8]) -> Result<Option<Block>, StorageError>;

    /// Store a block under its hash
    fn put_block(&self, hash: &[u8], block: &Block) -> Result<(), StorageError>;

    /// Entries waiting to be mined into a channel, oldest first
    fn get_block_entries(&self, channel: &str) -> Result<Vec<BlockEntry>, StorageError>;

    /// Queue an entry to be mined into a channel
    fn put_block_entry(&self, channel: &str, entry: &BlockEntry) -> Result<(), StorageError>;

    /// Drop a queued entry (after it was mined, or abandoned)
    fn remove_block_entry(&self, channel: &str, record_hash: &[u8]) -> Result<(), StorageError>;
}

/// Queue a record for mining into `channel_name`
///
/// Returns a reference to the pending record; it becomes part of the ledger
/// only once a block containing it is mined and adopted as head.
pub fn write_record(
    channel_name: &str,
    cache: &dyn Cache,
    record: Record,
) -> Result<Reference, StorageError> {
    let timestamp = record.timestamp;
    let entry = BlockEntry::new(record)?;
    cache.put_block_entry(channel_name, &entry)?;

    log::debug!(
        "Queued record {} on {}",
        &hex::encode(&entry.record_hash)[..16],
        channel_name
    );

    Ok(Reference {
        timestamp,
        channel_name: channel_name.to_string(),
        block_hash: None,
        record_hash: Some(entry.record_hash),
    })
}

/// In-memory store
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryCache {
    inner: RwLock<MemoryCacheInner>,
}

#[derive(Default)]
struct MemoryCacheInner {
    heads: HashMap<String, Reference>,
    blocks: HashMap<Vec<u8>, Block>,
    entries: HashMap<String, Vec<BlockEntry>>,
}

impl MemoryCache {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryCacheInner::default()),
        }
    }

    /// Number of blocks held
    pub fn block_count(&self) -> usize {
        self.inner.read().map(|inner| inner.blocks.len()).unwrap_or(0)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get_head(&self, channel: &str) -> Result<Option<Reference>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.heads.get(channel).cloned())
    }

    fn put_head(&self, channel: &str, reference: &Reference) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        inner.heads.insert(channel.to_string(), reference.clone());
        Ok(())
    }

    fn get_block(&self, hash: &[u8]) -> Result<Option<Block>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.blocks.get(hash).cloned())
    }

    fn put_block(&self, hash: &[u8], block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        inner.blocks.insert(hash.to_vec(), block.clone());
        Ok(())
    }

    fn get_block_entries(&self, channel: &str) -> Result<Vec<BlockEntry>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.entries.get(channel).cloned().unwrap_or_default())
    }

    fn put_block_entry(&self, channel: &str, entry: &BlockEntry) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        let queue = inner.entries.entry(channel.to_string()).or_default();
        if !queue.iter().any(|e| e.record_hash == entry.record_hash) {
            queue.push(entry.clone());
        }
        Ok(())
    }

    fn remove_block_entry(&self, channel: &str, record_hash: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(queue) = inner.entries.get_mut(channel) {
            queue.retain(|e| e.record_hash != record_hash);
        }
        Ok(())
    }
}
