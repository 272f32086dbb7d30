//! Newest-to-oldest traversal of a channel
//!
//! The iterator is a cursor over block hashes: each step fetches one block
//! from the store and moves to its predecessor. Dropping it mid-way has no
//! side effects, and a new one can be started from any hash.

use crate::core::block::Block;
use crate::core::record::Hash;
use crate::storage::{Cache, StorageError};

/// Iterator over `(hash, block)` pairs from a starting block back to genesis
pub struct BlockIterator<'a> {
    cache: &'a dyn Cache,
    next: Option<Hash>,
}

impl<'a> BlockIterator<'a> {
    /// Start at `start`; `None` yields an empty traversal
    pub fn new(cache: &'a dyn Cache, start: Option<Hash>) -> Self {
        Self { cache, next: start }
    }
}

impl Iterator for BlockIterator<'_> {
    type Item = Result<(Hash, Block), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        match self.cache.get_block(&hash) {
            Ok(Some(block)) => {
                self.next = block.previous.clone();
                Some(Ok((hash, block)))
            }
            Ok(None) => Some(Err(StorageError::BlockNotFound(hex::encode(&hash)))),
            Err(e) => Some(Err(e)),
        }
    }
}
