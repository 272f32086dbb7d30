//! Mining module turning queued records into proof-of-work blocks

pub mod listener;
pub mod miner;

pub use listener::{LogMiningListener, MiningListener, SilentMiningListener};
pub use miner::{MinedBlock, Miner, MiningError, MiningStats};
