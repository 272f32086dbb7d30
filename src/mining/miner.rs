//! Mining engine for channels
//!
//! Turns the records queued for a channel into a proof-of-work block and
//! adopts it as the channel's new head.

use crate::core::{timestamp, Block, Channel, ChannelError, Hash};
use crate::crypto::{leading_zeros, meets_difficulty};
use crate::mining::listener::MiningListener;
use crate::storage::{Cache, StorageError};
use log::info;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Nonce attempts between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Mining errors
#[derive(Error, Debug)]
pub enum MiningError {
    #[error("No entries to mine on {0}")]
    NoEntries(String),
    #[error("Mining cancelled")]
    Cancelled,
    #[error("Nonce space exhausted")]
    NonceExhausted,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Channel rejected mined block: {0}")]
    Channel(#[from] ChannelError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Mining task failed: {0}")]
    Task(String),
}

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

/// A block produced by [`Miner::mine`]
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub hash: Hash,
    pub block: Block,
    pub stats: MiningStats,
}

/// Miner for creating new blocks
#[derive(Debug, Clone)]
pub struct Miner {
    /// Alias recorded as the miner of each block
    pub name: String,
}

impl Miner {
    /// Create a new miner
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Mine every queued entry of `channel` into a new head block
    ///
    /// The effective threshold is never below the channel's own floor. Mined
    /// entries are removed from the queue once the block is the head.
    pub fn mine(
        &self,
        cache: &dyn Cache,
        channel: &Channel,
        threshold: u32,
        listener: &dyn MiningListener,
        cancel: &CancellationToken,
    ) -> Result<MinedBlock, MiningError> {
        let start = Instant::now();
        let threshold = threshold.max(channel.threshold);

        let entries = cache.get_block_entries(&channel.name)?;
        if entries.is_empty() {
            return Err(MiningError::NoEntries(channel.name.clone()));
        }

        let previous = channel
            .head_block(cache)?
            .map(|(hash, block)| (hash, block.length));

        let mut block = Block::new(timestamp(), &channel.name, previous, &self.name, entries);

        info!(
            "Mining block {} on {} with {} entries, threshold {}...",
            block.length,
            channel.name,
            block.entry_count(),
            threshold
        );
        listener.on_mining_started(&channel.name, block.entry_count());

        let mut best = 0;
        let mut attempts = 0u64;
        let hash = loop {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(MiningError::Cancelled);
            }

            let hash = block.hash()?;
            attempts += 1;

            let zeros = leading_zeros(&hash);
            if zeros > best {
                best = zeros;
                listener.on_new_best(block.nonce, zeros);
            }

            if meets_difficulty(&hash, threshold) {
                break hash;
            }

            block.nonce = block
                .nonce
                .checked_add(1)
                .ok_or(MiningError::NonceExhausted)?;
        };

        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };

        cache.put_block(&hash, &block)?;
        channel.update(cache, &hash, &block)?;

        for entry in &block.entries {
            cache.remove_block_entry(&channel.name, &entry.record_hash)?;
        }

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            block.length, elapsed, attempts, hash_rate
        );
        listener.on_mining_complete(&hash, &block);

        Ok(MinedBlock {
            hash,
            block,
            stats: MiningStats {
                hash_attempts: attempts,
                time_ms: elapsed,
                hash_rate,
            },
        })
    }
}
