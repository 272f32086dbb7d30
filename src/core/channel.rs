//! Channels: named, replicated, append-only chains of blocks
//!
//! A channel's head lives in the store. Updating it is the only way a block
//! becomes part of the ledger, and a candidate head replaces the current one
//! only when its chain validates and is strictly longer.

use crate::core::block::{Block, BlockError};
use crate::core::chain::BlockIterator;
use crate::core::record::{Hash, Reference};
use crate::storage::{Cache, StorageError};
use thiserror::Error;

/// Name of the channel holding alias registrations
pub const ALIAS_CHANNEL: &str = "Alias";

/// Default mining difficulty (number of leading zero bits)
pub const DEFAULT_THRESHOLD: u32 = 16;

/// Channel-related errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid block {hash}: {source}")]
    InvalidBlock {
        hash: String,
        #[source]
        source: BlockError,
    },
    #[error("Chain too short: current length {current}, candidate length {candidate}")]
    ChainTooShort { current: u64, candidate: u64 },
}

/// A named ledger whose head is tracked by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// Minimum proof of work accepted from any block in the channel
    pub threshold: u32,
}

impl Channel {
    pub fn new(name: &str, threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            threshold,
        }
    }

    /// The alias channel with the default proof-of-work floor
    pub fn alias() -> Self {
        Self::new(ALIAS_CHANNEL, DEFAULT_THRESHOLD)
    }

    /// Current head reference, if any block has been mined
    pub fn head(&self, cache: &dyn Cache) -> Result<Option<Reference>, StorageError> {
        cache.get_head(&self.name)
    }

    /// Current head hash and block
    pub fn head_block(&self, cache: &dyn Cache) -> Result<Option<(Hash, Block)>, StorageError> {
        let Some(head) = self.head(cache)? else {
            return Ok(None);
        };
        let Some(hash) = head.block_hash else {
            return Ok(None);
        };
        match cache.get_block(&hash)? {
            Some(block) => Ok(Some((hash, block))),
            None => Err(StorageError::BlockNotFound(hex::encode(&hash))),
        }
    }

    /// Length of the chain behind the current head (0 when empty)
    pub fn length(&self, cache: &dyn Cache) -> Result<u64, StorageError> {
        Ok(self
            .head_block(cache)?
            .map(|(_, block)| block.length)
            .unwrap_or(0))
    }

    /// Traverse the channel from its head back to genesis
    pub fn iter<'a>(&self, cache: &'a dyn Cache) -> Result<BlockIterator<'a>, StorageError> {
        let start = self.head(cache)?.and_then(|head| head.block_hash);
        Ok(BlockIterator::new(cache, start))
    }

    /// Validate the chain ending in `block`, whose ancestors must be in the store
    pub fn validate(
        &self,
        cache: &dyn Cache,
        hash: &[u8],
        block: &Block,
    ) -> Result<(), ChannelError> {
        let invalid = |hash: &[u8], source: BlockError| ChannelError::InvalidBlock {
            hash: hex::encode(hash),
            source,
        };

        self.check_block(hash, block).map_err(|e| invalid(hash, e))?;

        let mut expected_length = block.length;
        for item in BlockIterator::new(cache, block.previous.clone()) {
            let (ancestor_hash, ancestor) = item?;
            if expected_length <= 1 {
                return Err(invalid(
                    &ancestor_hash,
                    BlockError::InvalidLength {
                        expected: 0,
                        found: ancestor.length,
                    },
                ));
            }
            expected_length -= 1;
            if ancestor.length != expected_length {
                return Err(invalid(
                    &ancestor_hash,
                    BlockError::InvalidLength {
                        expected: expected_length,
                        found: ancestor.length,
                    },
                ));
            }
            self.check_block(&ancestor_hash, &ancestor)
                .map_err(|e| invalid(&ancestor_hash, e))?;
        }

        // the oldest block reached must be genesis
        if expected_length != 1 {
            return Err(invalid(
                hash,
                BlockError::InvalidLength {
                    expected: 1,
                    found: expected_length,
                },
            ));
        }

        Ok(())
    }

    fn check_block(&self, hash: &[u8], block: &Block) -> Result<(), BlockError> {
        if block.channel_name != self.name {
            return Err(BlockError::WrongChannel {
                expected: self.name.clone(),
                found: block.channel_name.clone(),
            });
        }
        block.validate(hash, self.threshold)
    }

    /// Adopt `block` as the new head if its chain is valid and longer
    pub fn update(
        &self,
        cache: &dyn Cache,
        hash: &[u8],
        block: &Block,
    ) -> Result<Reference, ChannelError> {
        if let Some(head) = self.head(cache)? {
            if head.block_hash.as_deref() == Some(hash) {
                return Ok(head);
            }
        }

        let current = self.length(cache)?;
        if block.length <= current {
            return Err(ChannelError::ChainTooShort {
                current,
                candidate: block.length,
            });
        }

        self.validate(cache, hash, block)?;

        let reference = Reference {
            timestamp: block.timestamp,
            channel_name: self.name.clone(),
            block_hash: Some(hash.to_vec()),
            record_hash: None,
        };
        cache.put_head(&self.name, &reference)?;

        log::info!(
            "Channel {} updated to {} (length {})",
            self.name,
            &hex::encode(hash)[..16],
            block.length
        );

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::meets_difficulty;
    use crate::storage::MemoryCache;

    fn mined(channel: &Channel, previous: Option<(Hash, u64)>) -> (Hash, Block) {
        let mut block = Block::new(1, &channel.name, previous, "miner", vec![]);
        loop {
            let hash = block.hash().unwrap();
            if meets_difficulty(&hash, channel.threshold) {
                return (hash, block);
            }
            block.nonce += 1;
        }
    }

    fn extend(cache: &MemoryCache, channel: &Channel, blocks: usize) -> (Hash, Block) {
        let mut previous = channel
            .head_block(cache)
            .unwrap()
            .map(|(hash, block)| (hash, block.length));
        let mut last = None;
        for _ in 0..blocks {
            let (hash, block) = mined(channel, previous.clone());
            cache.put_block(&hash, &block).unwrap();
            channel.update(cache, &hash, &block).unwrap();
            previous = Some((hash.clone(), block.length));
            last = Some((hash, block));
        }
        last.unwrap()
    }

    #[test]
    fn test_empty_channel() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 2);
        assert!(channel.head(&cache).unwrap().is_none());
        assert_eq!(channel.length(&cache).unwrap(), 0);
        assert_eq!(channel.iter(&cache).unwrap().count(), 0);
    }

    #[test]
    fn test_update_extends_head() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 2);
        let (hash, _) = extend(&cache, &channel, 3);

        let head = channel.head(&cache).unwrap().unwrap();
        assert_eq!(head.block_hash, Some(hash));
        assert_eq!(channel.length(&cache).unwrap(), 3);
    }

    #[test]
    fn test_shorter_chain_rejected() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 2);
        extend(&cache, &channel, 2);

        let (hash, block) = mined(&channel, None);
        cache.put_block(&hash, &block).unwrap();
        assert!(matches!(
            channel.update(&cache, &hash, &block),
            Err(ChannelError::ChainTooShort { current: 2, candidate: 1 })
        ));
    }

    #[test]
    fn test_same_head_is_noop() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 2);
        let (hash, block) = extend(&cache, &channel, 1);
        assert!(channel.update(&cache, &hash, &block).is_ok());
    }

    #[test]
    fn test_wrong_channel_rejected() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 0);
        let other = Channel::new("Other", 0);
        let (hash, block) = mined(&other, None);
        cache.put_block(&hash, &block).unwrap();
        assert!(matches!(
            channel.update(&cache, &hash, &block),
            Err(ChannelError::InvalidBlock { .. })
        ));
    }

    #[test]
    fn test_insufficient_work_rejected() {
        let cache = MemoryCache::new();
        let weak = Channel::new("Test", 0);
        let strict = Channel::new("Test", 40);
        let mut block = Block::new(1, "Test", None, "miner", vec![]);
        // find a hash that fails the strict threshold
        let hash = loop {
            let hash = block.hash().unwrap();
            if !meets_difficulty(&hash, strict.threshold) {
                break hash;
            }
            block.nonce += 1;
        };
        assert!(weak.validate(&cache, &hash, &block).is_ok());
        assert!(strict.validate(&cache, &hash, &block).is_err());
    }

    #[test]
    fn test_missing_ancestor_rejected() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Test", 0);
        let (hash, block) = mined(&channel, Some((vec![3; 64], 1)));
        cache.put_block(&hash, &block).unwrap();
        assert!(matches!(
            channel.update(&cache, &hash, &block),
            Err(ChannelError::Storage(StorageError::BlockNotFound(_)))
        ));
    }
}
