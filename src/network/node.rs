//! Ledger node
//!
//! Bundles the local store, the peer network and the miner, and serializes
//! writes to each channel so that mining and inbound broadcasts never race
//! on a head update.

use crate::core::{Channel, DEFAULT_THRESHOLD};
use crate::mining::{MinedBlock, Miner, MiningError, MiningListener};
use crate::network::client::{TcpNetwork, DEFAULT_TIMEOUT};
use crate::network::server::PeerServer;
use crate::network::sync;
use crate::network::{Network, NetworkError};
use crate::storage::{Cache, FileCache, MemoryCache, StorageConfig, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port for the peer server, none to stay client-only
    pub peer_port: Option<u16>,
    /// Peers to pull from and push to
    pub peers: Vec<String>,
    /// Data directory for the ledger
    pub data_dir: std::path::PathBuf,
    /// Name recorded as the miner of produced blocks
    pub miner: String,
    /// Minimum proof-of-work threshold in leading zero bits
    pub threshold: u32,
    /// Time allowed for each peer connect or reply
    pub timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_port: None,
            peers: Vec::new(),
            data_dir: StorageConfig::default().data_dir,
            miner: "alias-ledger".to_string(),
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A ledger node
pub struct Node {
    pub config: NodeConfig,
    pub cache: Arc<dyn Cache>,
    pub network: Option<Arc<dyn Network>>,
    pub miner: Miner,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Node {
    /// Create a node from its parts
    pub fn new(
        config: NodeConfig,
        cache: Arc<dyn Cache>,
        network: Option<Arc<dyn Network>>,
    ) -> Self {
        let miner = Miner::new(&config.miner);
        Self {
            config,
            cache,
            network,
            miner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open a node on its data directory, networked if peers are configured
    pub fn open(config: NodeConfig) -> Result<Self, StorageError> {
        let cache = FileCache::new(StorageConfig {
            data_dir: config.data_dir.clone(),
        })?;

        let network: Option<Arc<dyn Network>> = if config.peers.is_empty() {
            None
        } else {
            Some(Arc::new(
                TcpNetwork::new(config.peers.clone()).with_timeout(config.timeout),
            ))
        };

        log::info!(
            "Opened ledger at {} with {} peer(s)",
            config.data_dir.display(),
            config.peers.len()
        );
        Ok(Self::new(config, Arc::new(cache), network))
    }

    /// In-memory node without peers
    pub fn in_memory(config: NodeConfig) -> Self {
        Self::new(config, Arc::new(MemoryCache::new()), None)
    }

    /// Channel with this node's threshold floor applied
    pub fn channel(&self, name: &str) -> Channel {
        Channel::new(name, self.config.threshold)
    }

    /// Acquire the write lock for a channel
    ///
    /// Held across queue, mine and head update so concurrent writers and
    /// inbound broadcasts see a consistent head.
    pub async fn lock_channel(&self, channel: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(channel.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Pull the longest valid chain for `channel` from peers
    pub async fn pull(&self, channel: &Channel) -> Result<(), NetworkError> {
        let Some(network) = &self.network else {
            return Ok(());
        };
        let _guard = self.lock_channel(&channel.name).await;
        sync::pull(channel, self.cache.as_ref(), network.as_ref()).await
    }

    /// Push the head of `channel` to peers
    pub async fn push(&self, channel: &Channel) -> Result<(), NetworkError> {
        let Some(network) = &self.network else {
            return Ok(());
        };
        sync::push(channel, self.cache.as_ref(), network.as_ref()).await
    }

    /// Mine the queued entries of `channel` on a blocking thread
    ///
    /// Callers must hold the channel's write lock.
    pub async fn mine(
        &self,
        channel: &Channel,
        threshold: u32,
        listener: Arc<dyn MiningListener>,
        cancel: CancellationToken,
    ) -> Result<MinedBlock, MiningError> {
        let cache = self.cache.clone();
        let channel = channel.clone();
        let miner = self.miner.clone();

        tokio::task::spawn_blocking(move || {
            miner.mine(cache.as_ref(), &channel, threshold, listener.as_ref(), &cancel)
        })
        .await
        .map_err(|e| MiningError::Task(e.to_string()))?
    }

    /// Bind the peer server for the given channels, if a port is configured
    pub async fn peer_server(
        self: &Arc<Self>,
        host: &str,
        channels: Vec<Channel>,
    ) -> Result<Option<PeerServer>, std::io::Error> {
        let Some(port) = self.config.peer_port else {
            return Ok(None);
        };
        let server = PeerServer::bind(&format!("{}:{}", host, port), self.clone(), channels).await?;
        Ok(Some(server))
    }
}
