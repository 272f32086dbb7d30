//! Records, aliases and references
//!
//! A record is the signed envelope stored in a block entry. Alias records
//! carry a serialized [`Alias`] as their payload and are attributed to the
//! very alias they register.

use crate::crypto::encoding::{base64url, base64url_option};
use crate::crypto::{hash, EncryptionAlgorithm, PublicKeyFormat, SignatureAlgorithm};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content hash of a record or block (SHA-512)
pub type Hash = Vec<u8>;

/// Metadata key marking records written by a live (production) node
pub const LIVE_FLAG: &str = "LIVE";

/// Nanoseconds since the Unix epoch
pub fn timestamp() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or_default()
}

/// Render a ledger timestamp as `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn timestamp_to_string(timestamp: u64) -> String {
    let secs = (timestamp / 1_000_000_000) as i64;
    let nanos = (timestamp % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Binding of a name to an RSA public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    #[serde(with = "base64url")]
    pub public_key: Vec<u8>,
    pub public_format: PublicKeyFormat,
}

impl Alias {
    pub fn new(alias: &str, public_key: Vec<u8>, public_format: PublicKeyFormat) -> Self {
        Self {
            alias: alias.to_string(),
            public_key,
            public_format,
        }
    }

    /// Canonical payload bytes. Clients sign the hash of exactly these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Hash that a registration signature must cover
    pub fn signing_hash(&self) -> Result<Hash, serde_json::Error> {
        Ok(hash(&self.to_bytes()?))
    }
}

/// Signed envelope stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: u64,
    pub creator: String,
    #[serde(with = "base64url")]
    pub payload: Vec<u8>,
    pub encryption_algorithm: EncryptionAlgorithm,
    #[serde(with = "base64url")]
    pub signature: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl Record {
    /// Build the record registering `alias`, signed by its own key
    pub fn for_alias(
        alias: &Alias,
        signature: Vec<u8>,
        signature_algorithm: SignatureAlgorithm,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            timestamp: timestamp(),
            creator: alias.alias.clone(),
            payload: alias.to_bytes()?,
            encryption_algorithm: EncryptionAlgorithm::UnknownEncryption,
            signature,
            signature_algorithm,
            meta: BTreeMap::new(),
        })
    }

    /// Content hash identifying this record
    pub fn hash(&self) -> Result<Hash, serde_json::Error> {
        Ok(hash(&serde_json::to_vec(self)?))
    }
}

/// A record together with its content hash, as stored in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    #[serde(with = "base64url")]
    pub record_hash: Hash,
    pub record: Record,
}

impl BlockEntry {
    pub fn new(record: Record) -> Result<Self, serde_json::Error> {
        Ok(Self {
            record_hash: record.hash()?,
            record,
        })
    }
}

/// Pointer into a channel: a head block, or a record pending/contained in one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub timestamp: u64,
    pub channel_name: String,
    #[serde(default, with = "base64url_option", skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Hash>,
    #[serde(default, with = "base64url_option", skip_serializing_if = "Option::is_none")]
    pub record_hash: Option<Hash>,
}
