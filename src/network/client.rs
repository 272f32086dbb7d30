//! TCP implementation of [`Network`]

use crate::core::{Block, Reference};
use crate::network::message::Message;
use crate::network::server::MessageCodec;
use crate::network::{Network, NetworkError};
use crate::storage::Cache;
use async_trait::async_trait;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Default time allowed for each connect or reply
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Connection = Framed<TcpStream, MessageCodec>;

/// Talks to a fixed set of peers, one short connection per request
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    peers: Vec<String>,
    timeout: Duration,
}

impl TcpNetwork {
    pub fn new(peers: Vec<String>) -> Self {
        Self {
            peers,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self, peer: &str) -> Result<Connection, NetworkError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(peer))
            .await
            .map_err(|_| NetworkError::Timeout(format!("connection to {}", peer)))?
            .map_err(|e| NetworkError::ConnectionFailed {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Framed::new(stream, MessageCodec))
    }

    async fn receive(&self, peer: &str, conn: &mut Connection) -> Result<Message, NetworkError> {
        match tokio::time::timeout(self.timeout, conn.next()).await {
            Err(_) => Err(NetworkError::Timeout(format!("reply from {}", peer))),
            Ok(None) => Err(NetworkError::Disconnected(peer.to_string())),
            Ok(Some(msg)) => Ok(msg?),
        }
    }

    /// Send one message and wait for the reply
    async fn request(&self, peer: &str, msg: Message) -> Result<Message, NetworkError> {
        let mut conn = self.connect(peer).await?;
        conn.send(msg).await?;
        self.receive(peer, &mut conn).await
    }
}

fn unexpected(peer: &str, msg: &Message) -> NetworkError {
    match msg {
        Message::Rejected { reason } => NetworkError::Rejected {
            peer: peer.to_string(),
            reason: reason.clone(),
        },
        other => NetworkError::UnexpectedMessage {
            peer: peer.to_string(),
            found: other.type_name(),
        },
    }
}

#[async_trait]
impl Network for TcpNetwork {
    fn peers(&self) -> Vec<String> {
        self.peers.clone()
    }

    async fn get_head(
        &self,
        peer: &str,
        channel: &str,
    ) -> Result<Option<Reference>, NetworkError> {
        let reply = self
            .request(
                peer,
                Message::GetHead {
                    channel: channel.to_string(),
                },
            )
            .await?;

        match reply {
            Message::Head { reference, .. } => Ok(reference),
            other => Err(unexpected(peer, &other)),
        }
    }

    async fn get_block(&self, peer: &str, hash: &[u8]) -> Result<Block, NetworkError> {
        let reply = self
            .request(
                peer,
                Message::GetBlock {
                    hash: hash.to_vec(),
                },
            )
            .await?;

        match reply {
            Message::Block {
                block: Some(block), ..
            } => Ok(block),
            Message::Block { block: None, .. } => {
                Err(NetworkError::BlockUnavailable(hex::encode(hash)))
            }
            other => Err(unexpected(peer, &other)),
        }
    }

    async fn broadcast(
        &self,
        peer: &str,
        cache: &dyn Cache,
        channel: &str,
        hash: &[u8],
        block: &Block,
    ) -> Result<Reference, NetworkError> {
        let mut conn = self.connect(peer).await?;
        conn.send(Message::Broadcast {
            channel: channel.to_string(),
            hash: hash.to_vec(),
            block: block.clone(),
        })
        .await?;

        loop {
            match self.receive(peer, &mut conn).await? {
                Message::NeedBlock { hash } => {
                    let block = cache.get_block(&hash)?;
                    if block.is_none() {
                        log::warn!("Peer {} asked for unknown block {}", peer, hex::encode(&hash));
                    }
                    conn.send(Message::Block { hash, block }).await?;
                }
                Message::Accepted { reference } => return Ok(reference),
                other => return Err(unexpected(peer, &other)),
            }
        }
    }
}
