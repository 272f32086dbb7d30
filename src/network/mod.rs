//! Peer-to-peer synchronization of channels
//!
//! Provides the replication the registration protocol relies on: pulling
//! the longest valid chain from peers before a read-modify-write, and
//! pushing a freshly mined head afterwards.
//!
//! # Features
//! - Length-prefixed JSON framing over TCP
//! - Head and block queries for pulls
//! - Broadcast handshake that backfills missing ancestors on the receiver
//! - Per-channel write serialization shared by mining and inbound broadcasts

pub mod client;
pub mod message;
pub mod node;
pub mod server;
pub mod sync;

use crate::core::{Block, ChannelError, Reference};
use crate::storage::{Cache, StorageError};
use async_trait::async_trait;
use thiserror::Error;

pub use client::TcpNetwork;
pub use message::{Message, MAGIC, MAX_MESSAGE_SIZE};
pub use node::{Node, NodeConfig};
pub use server::{MessageCodec, PeerServer};
pub use sync::{pull, push};

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: String, reason: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Peer {0} disconnected")]
    Disconnected(String),
    #[error("Unexpected {found} message from {peer}")]
    UnexpectedMessage { peer: String, found: &'static str },
    #[error("Peer {peer} rejected request: {reason}")]
    Rejected { peer: String, reason: String },
    #[error("Block {0} not available")]
    BlockUnavailable(String),
    #[error("Block {0} does not match its hash")]
    InvalidBlock(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("All {0} peers failed")]
    AllPeersFailed(usize),
}

/// Transport used to reconcile channels with peers
#[async_trait]
pub trait Network: Send + Sync {
    /// Addresses of the peers to synchronize with
    fn peers(&self) -> Vec<String>;

    /// Fetch a peer's head for a channel
    async fn get_head(&self, peer: &str, channel: &str)
        -> Result<Option<Reference>, NetworkError>;

    /// Fetch a block from a peer
    async fn get_block(&self, peer: &str, hash: &[u8]) -> Result<Block, NetworkError>;

    /// Offer a head block to a peer, serving any ancestors it asks for from `cache`
    async fn broadcast(
        &self,
        peer: &str,
        cache: &dyn Cache,
        channel: &str,
        hash: &[u8],
        block: &Block,
    ) -> Result<Reference, NetworkError>;
}
