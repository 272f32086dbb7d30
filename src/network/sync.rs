//! Channel synchronization with peers
//!
//! A pull adopts the longest valid chain any peer offers. A push offers the
//! local head to every peer. Individual peer failures are logged; only a
//! sync in which every peer failed is reported as an error.

use crate::core::{Block, Channel, ChannelError, Hash};
use crate::network::{Network, NetworkError};
use crate::storage::Cache;

impl Channel {
    /// Pull this channel from every peer of `network`
    pub async fn pull(&self, cache: &dyn Cache, network: &dyn Network) -> Result<(), NetworkError> {
        pull(self, cache, network).await
    }

    /// Push this channel's head to every peer of `network`
    pub async fn push(&self, cache: &dyn Cache, network: &dyn Network) -> Result<(), NetworkError> {
        push(self, cache, network).await
    }
}

/// Pull `channel` from every peer, adopting any longer valid chain
pub async fn pull(
    channel: &Channel,
    cache: &dyn Cache,
    network: &dyn Network,
) -> Result<(), NetworkError> {
    let peers = network.peers();
    if peers.is_empty() {
        return Ok(());
    }

    let mut failures = 0;
    for peer in &peers {
        if let Err(e) = pull_from(channel, cache, network, peer).await {
            log::warn!("Failed to pull {} from {}: {}", channel.name, peer, e);
            failures += 1;
        }
    }

    if failures == peers.len() {
        return Err(NetworkError::AllPeersFailed(failures));
    }
    Ok(())
}

async fn pull_from(
    channel: &Channel,
    cache: &dyn Cache,
    network: &dyn Network,
    peer: &str,
) -> Result<(), NetworkError> {
    let Some(head_hash) = network
        .get_head(peer, &channel.name)
        .await?
        .and_then(|reference| reference.block_hash)
    else {
        return Ok(());
    };

    if channel.head(cache)?.and_then(|r| r.block_hash).as_ref() == Some(&head_hash) {
        return Ok(());
    }

    let head_block = fetch_block(cache, network, peer, &head_hash).await?;

    // Walk back until reaching a block we already hold
    let mut next = head_block.previous.clone();
    while let Some(hash) = next {
        if cache.get_block(&hash)?.is_some() {
            break;
        }
        let block = fetch_block(cache, network, peer, &hash).await?;
        next = block.previous.clone();
    }

    match channel.update(cache, &head_hash, &head_block) {
        Ok(_) => {
            log::debug!("Pulled {} (length {}) from {}", channel.name, head_block.length, peer);
            Ok(())
        }
        Err(ChannelError::ChainTooShort { current, candidate }) => {
            log::debug!(
                "Kept local {} (length {}) over {} from {}",
                channel.name,
                current,
                candidate,
                peer
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch a block, check it against its hash and store it
async fn fetch_block(
    cache: &dyn Cache,
    network: &dyn Network,
    peer: &str,
    hash: &Hash,
) -> Result<Block, NetworkError> {
    if let Some(block) = cache.get_block(hash)? {
        return Ok(block);
    }

    let block = network.get_block(peer, hash).await?;
    if &block.hash()? != hash {
        return Err(NetworkError::InvalidBlock(hex::encode(hash)));
    }
    cache.put_block(hash, &block)?;
    Ok(block)
}

/// Offer the head of `channel` to every peer
pub async fn push(
    channel: &Channel,
    cache: &dyn Cache,
    network: &dyn Network,
) -> Result<(), NetworkError> {
    let peers = network.peers();
    let Some((hash, block)) = channel.head_block(cache)? else {
        return Ok(());
    };
    if peers.is_empty() {
        return Ok(());
    }

    let mut failures = 0;
    for peer in &peers {
        match network
            .broadcast(peer, cache, &channel.name, &hash, &block)
            .await
        {
            Ok(_) => log::info!("Pushed {} (length {}) to {}", channel.name, block.length, peer),
            Err(e) => {
                log::warn!("Failed to push {} to {}: {}", channel.name, peer, e);
                failures += 1;
            }
        }
    }

    if failures == peers.len() {
        return Err(NetworkError::AllPeersFailed(failures));
    }
    Ok(())
}
