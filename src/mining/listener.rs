//! Mining progress callbacks

use crate::core::Block;

/// Observer of a mining run. All callbacks default to doing nothing.
pub trait MiningListener: Send + Sync {
    /// A block with `size` entries is about to be mined on `channel`
    fn on_mining_started(&self, _channel: &str, _size: usize) {}

    /// A nonce produced more leading zero bits than any before it
    fn on_new_best(&self, _nonce: u64, _zeros: u32) {}

    /// The block met the threshold and became the channel head
    fn on_mining_complete(&self, _hash: &[u8], _block: &Block) {}
}

/// Listener that ignores every event
pub struct SilentMiningListener;

impl MiningListener for SilentMiningListener {}

/// Listener that reports progress through the log
pub struct LogMiningListener;

impl MiningListener for LogMiningListener {
    fn on_mining_started(&self, channel: &str, size: usize) {
        log::info!("Mining {} entries on {}", size, channel);
    }

    fn on_new_best(&self, nonce: u64, zeros: u32) {
        log::debug!("Nonce {} reached {} leading zero bits", nonce, zeros);
    }

    fn on_mining_complete(&self, hash: &[u8], block: &Block) {
        log::info!(
            "Mined {} block {} ({} entries)",
            block.channel_name,
            crate::crypto::encode_base64url(hash),
            block.entry_count()
        );
    }
}
