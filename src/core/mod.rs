//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Records (signed envelopes) and the aliases they carry
//! - Blocks (mined, hash-linked batches of records)
//! - Channels (named chains whose head lives in the store)
//! - Newest-to-oldest chain traversal

pub mod block;
pub mod chain;
pub mod channel;
pub mod record;

pub use block::{Block, BlockError};
pub use chain::BlockIterator;
pub use channel::{Channel, ChannelError, ALIAS_CHANNEL, DEFAULT_THRESHOLD};
pub use record::{
    timestamp, timestamp_to_string, Alias, BlockEntry, Hash, Record, Reference, LIVE_FLAG,
};
