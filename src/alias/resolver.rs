//! Alias resolution by scanning a channel
//!
//! Lookups walk the channel from its head towards genesis and stop at the
//! first entry binding the name, so the newest registration wins. A payload
//! that fails to decode ends the traversal with an error instead of being
//! skipped.

use crate::core::{Alias, BlockIterator, Channel, Hash, Record};
use crate::crypto::{parse_rsa_public_key, KeyError};
use crate::storage::{Cache, StorageError};
use rsa::RsaPublicKey;
use std::collections::VecDeque;
use thiserror::Error;

/// Resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Alias not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(#[from] KeyError),
}

/// A registration found in a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub alias: Alias,
    pub record: Record,
    pub record_hash: Hash,
    pub block_hash: Hash,
}

/// Lazy newest-first sequence of the registrations in a channel
///
/// Holds one block's entries at a time; dropping it midway has no effect.
pub struct AliasIter<'a> {
    blocks: BlockIterator<'a>,
    pending: VecDeque<AliasEntry>,
    failed: bool,
}

impl<'a> AliasIter<'a> {
    pub fn new(channel: &Channel, cache: &'a dyn Cache) -> Result<Self, StorageError> {
        Ok(Self {
            blocks: channel.iter(cache)?,
            pending: VecDeque::new(),
            failed: false,
        })
    }
}

impl<'a> Iterator for AliasIter<'a> {
    type Item = Result<AliasEntry, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(entry) = self.pending.pop_front() {
                return Some(Ok(entry));
            }

            let (block_hash, block) = match self.blocks.next()? {
                Ok(next) => next,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };

            for entry in block.entries {
                match Alias::from_bytes(&entry.record.payload) {
                    Ok(alias) => self.pending.push_back(AliasEntry {
                        alias,
                        record: entry.record,
                        record_hash: entry.record_hash,
                        block_hash: block_hash.clone(),
                    }),
                    Err(e) => {
                        self.failed = true;
                        self.pending.clear();
                        return Some(Err(StorageError::CorruptRecord {
                            record: hex::encode(&entry.record_hash),
                            reason: e.to_string(),
                        }));
                    }
                }
            }
        }
    }
}

/// Find the newest registration of `name`, if any
pub fn find_alias(
    channel: &Channel,
    cache: &dyn Cache,
    name: &str,
) -> Result<Option<AliasEntry>, StorageError> {
    for entry in AliasIter::new(channel, cache)? {
        let entry = entry?;
        if entry.alias.alias == name {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Resolve `name` to the record and alias binding it
pub fn get_record(
    channel: &Channel,
    cache: &dyn Cache,
    name: &str,
) -> Result<(Record, Alias), ResolveError> {
    let entry = find_alias(channel, cache, name)?
        .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
    log::debug!("Resolved {} in block {}", name, hex::encode(&entry.block_hash));
    Ok((entry.record, entry.alias))
}

/// Every registration in the channel, newest block first
pub fn list_aliases(channel: &Channel, cache: &dyn Cache) -> Result<Vec<AliasEntry>, StorageError> {
    AliasIter::new(channel, cache)?.collect()
}

/// Parsed RSA key bound to `name`
pub fn get_public_key(
    channel: &Channel,
    cache: &dyn Cache,
    name: &str,
) -> Result<RsaPublicKey, ResolveError> {
    let (_, alias) = get_record(channel, cache, name)?;
    Ok(parse_rsa_public_key(&alias.public_key, alias.public_format)?)
}

/// Name bound to the given public key bytes
pub fn get_alias_for_key(
    channel: &Channel,
    cache: &dyn Cache,
    public_key: &[u8],
) -> Result<String, ResolveError> {
    for entry in AliasIter::new(channel, cache)? {
        let entry = entry?;
        if entry.alias.public_key == public_key {
            return Ok(entry.alias.alias);
        }
    }
    Err(ResolveError::NotFound(hex::encode(public_key)))
}
