//! Block implementation for channels
//!
//! A block is a mined batch of record entries, hash-linked to its
//! predecessor in the same channel.

use crate::core::record::{BlockEntry, Hash};
use crate::crypto::encoding::base64url_option;
use crate::crypto::{hash, meets_difficulty};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block validation errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Block belongs to channel {found}, expected {expected}")]
    WrongChannel { expected: String, found: String },
    #[error("Invalid proof of work: {0} bits required")]
    InvalidProofOfWork(u32),
    #[error("Invalid block hash")]
    InvalidBlockHash,
    #[error("Invalid record hash in entry {0}")]
    InvalidRecordHash(usize),
    #[error("Invalid block length: expected {expected}, got {found}")]
    InvalidLength { expected: u64, found: u64 },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A block in a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block creation timestamp (ns since the Unix epoch)
    pub timestamp: u64,
    /// Channel this block extends
    pub channel_name: String,
    /// Number of blocks from genesis, inclusive
    pub length: u64,
    /// Hash of the previous block, absent for genesis
    #[serde(default, with = "base64url_option", skip_serializing_if = "Option::is_none")]
    pub previous: Option<Hash>,
    /// Alias of the node that mined the block
    pub miner: String,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Records included in this block
    pub entries: Vec<BlockEntry>,
}

impl Block {
    /// Create a new block (unmined)
    pub fn new(
        timestamp: u64,
        channel_name: &str,
        previous: Option<(Hash, u64)>,
        miner: &str,
        entries: Vec<BlockEntry>,
    ) -> Self {
        let (previous, length) = match previous {
            Some((hash, length)) => (Some(hash), length + 1),
            None => (None, 1),
        };
        Self {
            timestamp,
            channel_name: channel_name.to_string(),
            length,
            previous,
            miner: miner.to_string(),
            nonce: 0,
            entries,
        }
    }

    /// Calculate the hash of the block
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        Ok(hash(&serde_json::to_vec(self)?))
    }

    /// Check the block on its own: hash, proof of work and entry hashes
    pub fn validate(&self, expected_hash: &[u8], threshold: u32) -> Result<(), BlockError> {
        if self.hash()? != expected_hash {
            return Err(BlockError::InvalidBlockHash);
        }

        if !meets_difficulty(expected_hash, threshold) {
            return Err(BlockError::InvalidProofOfWork(threshold));
        }

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.record.hash()? != entry.record_hash {
                return Err(BlockError::InvalidRecordHash(index));
            }
        }

        Ok(())
    }

    /// Get number of entries in this block
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
