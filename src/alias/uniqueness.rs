//! Advisory uniqueness check for alias names
//!
//! The check runs against the local replica after a best-effort pull. It is
//! not a compare-and-swap: two nodes can both pass it for the same name
//! before either has seen the other's block, and readers then resolve
//! whichever binding their traversal reaches first.

use crate::alias::resolver::find_alias;
use crate::core::{Alias, Channel};
use crate::network::Network;
use crate::storage::{Cache, StorageError};
use thiserror::Error;

/// Uniqueness check errors
#[derive(Error, Debug)]
pub enum UniquenessError {
    #[error("Alias {} already registered", existing.alias)]
    AliasAlreadyExists { existing: Alias, timestamp: u64 },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Checks that no record in a channel binds a name
#[derive(Debug, Clone)]
pub struct UniquenessChecker {
    channel: Channel,
}

impl UniquenessChecker {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Refresh from peers if possible, then check `name`
    pub async fn check(
        &self,
        cache: &dyn Cache,
        network: Option<&dyn Network>,
        name: &str,
    ) -> Result<(), UniquenessError> {
        if let Some(network) = network {
            if let Err(e) = self.channel.pull(cache, network).await {
                log::warn!(
                    "Checking {} against a possibly stale {}: {}",
                    name,
                    self.channel.name,
                    e
                );
            }
        }
        self.check_synced(cache, name)
    }

    /// Check `name` against the replica as it stands
    pub fn check_synced(&self, cache: &dyn Cache, name: &str) -> Result<(), UniquenessError> {
        match find_alias(&self.channel, cache, name)? {
            Some(entry) => Err(UniquenessError::AliasAlreadyExists {
                existing: entry.alias,
                timestamp: entry.record.timestamp,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, BlockEntry, Record, Reference};
    use crate::crypto::{PublicKeyFormat, SignatureAlgorithm};
    use crate::network::NetworkError;
    use crate::storage::MemoryCache;
    use async_trait::async_trait;

    struct UnreachableNetwork;

    #[async_trait]
    impl Network for UnreachableNetwork {
        fn peers(&self) -> Vec<String> {
            vec!["10.0.0.1:1".to_string()]
        }

        async fn get_head(
            &self,
            peer: &str,
            _channel: &str,
        ) -> Result<Option<Reference>, NetworkError> {
            Err(NetworkError::Disconnected(peer.to_string()))
        }

        async fn get_block(&self, peer: &str, _hash: &[u8]) -> Result<Block, NetworkError> {
            Err(NetworkError::Disconnected(peer.to_string()))
        }

        async fn broadcast(
            &self,
            peer: &str,
            _cache: &dyn Cache,
            _channel: &str,
            _hash: &[u8],
            _block: &Block,
        ) -> Result<Reference, NetworkError> {
            Err(NetworkError::Disconnected(peer.to_string()))
        }
    }

    fn register(cache: &MemoryCache, channel: &Channel, name: &str) {
        let alias = Alias::new(name, vec![1, 2, 3], PublicKeyFormat::Pkix);
        let record = Record::for_alias(&alias, vec![4], SignatureAlgorithm::Sha512WithRsa).unwrap();
        let entries = vec![BlockEntry::new(record).unwrap()];
        let block = Block::new(5, &channel.name, None, "test", entries);
        let hash = block.hash().unwrap();
        cache.put_block(&hash, &block).unwrap();
        channel.update(cache, &hash, &block).unwrap();
    }

    #[tokio::test]
    async fn test_unique_and_taken() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Alias", 0);
        register(&cache, &channel, "Alice");

        let checker = UniquenessChecker::new(channel);
        assert!(checker.check(&cache, None, "Bob").await.is_ok());

        match checker.check(&cache, None, "Alice").await {
            Err(UniquenessError::AliasAlreadyExists { existing, .. }) => {
                assert_eq!(existing.alias, "Alice");
                assert_eq!(existing.public_key, vec![1, 2, 3]);
            }
            other => panic!("expected AliasAlreadyExists, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_pull_is_not_fatal() {
        let cache = MemoryCache::new();
        let channel = Channel::new("Alias", 0);
        register(&cache, &channel, "Alice");

        let checker = UniquenessChecker::new(channel);
        let network = UnreachableNetwork;
        assert!(checker.check(&cache, Some(&network), "Bob").await.is_ok());
        assert!(matches!(
            checker.check(&cache, Some(&network), "Alice").await,
            Err(UniquenessError::AliasAlreadyExists { .. })
        ));
    }
}
