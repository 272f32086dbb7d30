//! TCP server and connection handling
//!
//! Answers peers' head and block queries and accepts broadcast heads,
//! asking the sender for any ancestors missing from the local store.

use crate::core::{Block, Channel};
use crate::network::message::{Message, MAGIC, MAX_MESSAGE_SIZE};
use crate::network::node::Node;
use crate::network::NetworkError;
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Most ancestors a single broadcast may backfill
const MAX_BROADCAST_DEPTH: usize = 10_000;

/// Message codec for length-prefixed framing
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item
            .to_bytes()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        // Magic (4) + Length (4) + Data
        dst.reserve(8 + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least header
        if src.len() < 8 {
            return Ok(None);
        }

        // Check magic
        if src[..4] != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        // Get length
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Message too large: {} bytes", len),
            ));
        }

        // Check if we have full message
        if src.len() < 8 + len {
            src.reserve(8 + len - src.len());
            return Ok(None);
        }

        // Skip header
        src.advance(8);

        // Extract message data
        let data = src.split_to(len);

        // Deserialize
        let msg = Message::from_bytes(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(msg))
    }
}

type Connection = Framed<TcpStream, MessageCodec>;

/// TCP server answering peers on behalf of a node
pub struct PeerServer {
    listener: TcpListener,
    node: Arc<Node>,
    channels: Arc<HashMap<String, Channel>>,
}

impl PeerServer {
    /// Bind to an address, serving the given channels
    pub async fn bind(
        addr: &str,
        node: Arc<Node>,
        channels: Vec<Channel>,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Peer server listening on {}", listener.local_addr()?);

        let channels = channels
            .into_iter()
            .map(|channel| (channel.name.clone(), channel))
            .collect();

        Ok(Self {
            listener,
            node,
            channels: Arc::new(channels),
        })
    }

    /// Get the bound address
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<(), std::io::Error> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let node = self.node.clone();
            let channels = self.channels.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, node, channels).await {
                    log::warn!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }
}

/// Serve one peer connection until it closes
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    node: Arc<Node>,
    channels: Arc<HashMap<String, Channel>>,
) -> Result<(), NetworkError> {
    let mut conn = Framed::new(stream, MessageCodec);

    while let Some(msg) = conn.next().await {
        let msg = msg?;
        log::debug!("Received {} from {}", msg.type_name(), addr);

        match msg {
            Message::GetHead { channel } => {
                let reference = if channels.contains_key(&channel) {
                    node.cache.get_head(&channel)?
                } else {
                    None
                };
                conn.send(Message::Head { channel, reference }).await?;
            }
            Message::GetBlock { hash } => {
                let block = node.cache.get_block(&hash)?;
                conn.send(Message::Block { hash, block }).await?;
            }
            Message::Broadcast {
                channel,
                hash,
                block,
            } => {
                let reply = match channels.get(&channel) {
                    Some(channel) => {
                        accept_broadcast(&mut conn, &node, channel, hash, block).await?
                    }
                    None => Message::Rejected {
                        reason: format!("Unknown channel {}", channel),
                    },
                };
                conn.send(reply).await?;
            }
            other => {
                conn.send(Message::Rejected {
                    reason: format!("Unexpected {}", other.type_name()),
                })
                .await?;
            }
        }
    }

    log::debug!("Peer {} disconnected", addr);
    Ok(())
}

/// Backfill the ancestors of a broadcast head, then try to adopt it
async fn accept_broadcast(
    conn: &mut Connection,
    node: &Node,
    channel: &Channel,
    hash: Vec<u8>,
    block: Block,
) -> Result<Message, NetworkError> {
    let rejected = |reason: String| Ok(Message::Rejected { reason });

    if block.hash()? != hash {
        return rejected("Block does not match its hash".to_string());
    }

    let mut received = vec![(hash.clone(), block.clone())];
    let mut next = block.previous.clone();
    while let Some(previous) = next {
        if node.cache.get_block(&previous)?.is_some() {
            break;
        }
        if received.len() > MAX_BROADCAST_DEPTH {
            return rejected("Broadcast too deep".to_string());
        }

        conn.send(Message::NeedBlock {
            hash: previous.clone(),
        })
        .await?;

        match conn.next().await {
            Some(Ok(Message::Block {
                hash: sent,
                block: Some(ancestor),
            })) if sent == previous => {
                if ancestor.hash()? != previous {
                    return rejected("Ancestor does not match its hash".to_string());
                }
                next = ancestor.previous.clone();
                received.push((previous, ancestor));
            }
            Some(Ok(_)) => return rejected("Missing ancestor".to_string()),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(NetworkError::Disconnected("broadcast sender".to_string())),
        }
    }

    let _guard = node.lock_channel(&channel.name).await;

    for (hash, block) in &received {
        node.cache.put_block(hash, block)?;
    }

    match channel.update(node.cache.as_ref(), &hash, &block) {
        Ok(reference) => Ok(Message::Accepted { reference }),
        Err(e) => {
            log::info!("Rejected broadcast on {}: {}", channel.name, e);
            rejected(e.to_string())
        }
    }
}
