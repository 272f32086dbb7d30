//! Network message types for peer synchronization
//!
//! Every exchange is a short request/response conversation over a fresh
//! connection: head and block queries for pulls, and a broadcast handshake
//! for pushes in which the receiver asks for the ancestors it lacks.

use crate::core::{Block, Reference};
use crate::crypto::encoding::base64url;
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x41, 0x4C, 0x49, 0x53]; // "ALIS"

/// Largest frame accepted from a peer
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Network message types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Ask for a channel's head
    GetHead { channel: String },

    /// Head of a channel, absent if the peer has none
    Head {
        channel: String,
        reference: Option<Reference>,
    },

    /// Ask for a block by hash
    GetBlock {
        #[serde(with = "base64url")]
        hash: Vec<u8>,
    },

    /// A block, absent if the peer does not have it
    Block {
        #[serde(with = "base64url")]
        hash: Vec<u8>,
        block: Option<Block>,
    },

    /// Offer a new head block for a channel
    Broadcast {
        channel: String,
        #[serde(with = "base64url")]
        hash: Vec<u8>,
        block: Block,
    },

    /// Receiver of a broadcast lacks this ancestor
    NeedBlock {
        #[serde(with = "base64url")]
        hash: Vec<u8>,
    },

    /// Broadcast adopted; carries the receiver's new head
    Accepted { reference: Reference },

    /// Broadcast or request refused
    Rejected { reason: String },
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::GetHead { .. } => "GetHead",
            Message::Head { .. } => "Head",
            Message::GetBlock { .. } => "GetBlock",
            Message::Block { .. } => "Block",
            Message::Broadcast { .. } => "Broadcast",
            Message::NeedBlock { .. } => "NeedBlock",
            Message::Accepted { .. } => "Accepted",
            Message::Rejected { .. } => "Rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::GetBlock {
            hash: vec![1, 2, 3],
        };
        let bytes = msg.to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();

        if let Message::GetBlock { hash } = decoded {
            assert_eq!(hash, vec![1, 2, 3]);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_type_names() {
        let msg = Message::Rejected {
            reason: "no".to_string(),
        };
        assert_eq!(msg.type_name(), "Rejected");
        assert_eq!(
            Message::GetHead {
                channel: "Alias".to_string()
            }
            .type_name(),
            "GetHead"
        );
    }
}
