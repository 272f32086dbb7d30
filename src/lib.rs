//! Alias Ledger: bind human-readable names to RSA public keys
//!
//! Registrations are self-signed claims appended to a replicated,
//! proof-of-work ordered ledger channel. This crate provides:
//! - SHA-512 hashing and RSA (PKIX / PKCS#1) key and signature handling
//! - Hash-linked blocks, channels and newest-first chain traversal
//! - In-memory and file-backed ledger stores
//! - Proof-of-work mining with progress listeners and cancellation
//! - Peer pull/push over a framed TCP protocol
//! - The registration flow, uniqueness check and alias resolver
//! - An axum HTTP API and a clap CLI
//!
//! # Example
//!
//! ```rust,no_run
//! use alias_ledger::alias::{Claim, Registrar};
//! use alias_ledger::crypto::{KeyPair, PublicKeyFormat, SignatureAlgorithm};
//! use alias_ledger::network::{Node, NodeConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let node = Arc::new(Node::open(NodeConfig::default())?);
//! let registrar = Registrar::new(node);
//!
//! // Clients sign the hash of the alias they claim
//! let key = KeyPair::generate(2048)?;
//! let claim = Claim::signed(
//!     "Alice",
//!     &key,
//!     PublicKeyFormat::Pkix,
//!     SignatureAlgorithm::Sha512WithRsaPss,
//! )?;
//!
//! let registration = registrar.register(&claim).await?;
//! println!("Registered in block {}", hex::encode(&registration.block_hash));
//! # Ok(())
//! # }
//! ```

pub mod alias;
pub mod api;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use alias::{Claim, Registrar, Registration, RegistrationError, RegistrationState};
pub use api::{create_router, ApiState};
pub use core::{Alias, Block, Channel, Record, Reference, ALIAS_CHANNEL};
pub use crypto::KeyPair;
pub use mining::Miner;
pub use network::{Node, NodeConfig};
pub use storage::{Cache, FileCache, MemoryCache};
