//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-512 hashing and the proof-of-work difficulty check
//! - RSA public key parsing, signing and signature verification
//! - base64url encodings for keys, signatures and hashes

pub mod encoding;
pub mod hash;
pub mod keys;

pub use encoding::{decode_base64url, encode_base64url};
pub use hash::{hash, leading_zeros, meets_difficulty, HASH_LEN};
pub use keys::{
    create_signature, parse_rsa_public_key, rsa_public_key_to_bytes, verify_signature,
    EncryptionAlgorithm, KeyError, KeyPair, PublicKeyFormat, SignatureAlgorithm,
    DEFAULT_KEY_BITS, MIN_PSS_KEY_BYTES,
};
