//! RSA key management for alias registration
//!
//! Aliases bind a name to an RSA public key. The key travels as DER bytes in
//! one of the supported [`PublicKeyFormat`]s, and the claim is signed over
//! the SHA-512 hash of the alias payload using a [`SignatureAlgorithm`].

use crate::crypto::hash::HASH_LEN;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default modulus size for generated keys
pub const DEFAULT_KEY_BITS: usize = 4096;

/// Smallest modulus in bytes that fits a SHA-512 PSS encoding with a
/// digest-length salt
pub const MIN_PSS_KEY_BYTES: usize = 2 * HASH_LEN + 2;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Unrecognized public key format: {0}")]
    UnknownPublicKeyFormat(String),
    #[error("Unrecognized signature algorithm: {0}")]
    UnknownSignatureAlgorithm(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("Signature verification failed")]
    VerificationFailed,
    #[error("Signing failed: {0}")]
    SigningFailed(String),
    #[error("Key generation failed: {0}")]
    GenerationFailed(String),
}

/// Encoding of the public key bytes bound by an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKeyFormat {
    /// PKCS#1 `RSAPublicKey` DER
    #[serde(rename = "PKCS1_WITH_RSA")]
    Pkcs1WithRsa,
    /// X.509 `SubjectPublicKeyInfo` DER
    #[serde(rename = "PKIX")]
    Pkix,
}

impl PublicKeyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicKeyFormat::Pkcs1WithRsa => "PKCS1_WITH_RSA",
            PublicKeyFormat::Pkix => "PKIX",
        }
    }
}

impl FromStr for PublicKeyFormat {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PKCS1_WITH_RSA" => Ok(PublicKeyFormat::Pkcs1WithRsa),
            "PKIX" => Ok(PublicKeyFormat::Pkix),
            other => Err(KeyError::UnknownPublicKeyFormat(other.to_string())),
        }
    }
}

impl fmt::Display for PublicKeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature scheme used to prove possession of the private key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 over a SHA-512 digest
    #[serde(rename = "SHA512WITHRSA")]
    Sha512WithRsa,
    /// RSASSA-PSS over a SHA-512 digest, salt length equal to the digest length
    #[serde(rename = "SHA512WITHRSA_PSS")]
    Sha512WithRsaPss,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha512WithRsa => "SHA512WITHRSA",
            SignatureAlgorithm::Sha512WithRsaPss => "SHA512WITHRSA_PSS",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA512WITHRSA" => Ok(SignatureAlgorithm::Sha512WithRsa),
            "SHA512WITHRSA_PSS" => Ok(SignatureAlgorithm::Sha512WithRsaPss),
            other => Err(KeyError::UnknownSignatureAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload encryption applied to a record. Alias records are public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[default]
    #[serde(rename = "UNKNOWN_ENCRYPTION")]
    UnknownEncryption,
}

/// An RSA key pair used by clients to sign alias claims
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generate a new random key pair with the given modulus size
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| KeyError::GenerationFailed(e.to_string()))?;
        Ok(Self::from_private_key(private_key))
    }

    /// Create a key pair from an existing private key
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        Self {
            private_key,
            public_key,
        }
    }

    /// Load a key pair from a PKCS#8 PEM private key
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_private_key(private_key))
    }

    /// Encode the private key as PKCS#8 PEM
    pub fn to_pem(&self) -> Result<String, KeyError> {
        let pem = self
            .private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Public key bytes in the requested format
    pub fn public_key_bytes(&self, format: PublicKeyFormat) -> Result<Vec<u8>, KeyError> {
        rsa_public_key_to_bytes(&self.public_key, format)
    }

    /// Sign a SHA-512 digest with the private key
    pub fn sign(&self, hash: &[u8], algorithm: SignatureAlgorithm) -> Result<Vec<u8>, KeyError> {
        create_signature(&self.private_key, hash, algorithm)
    }
}

/// Parse RSA public key bytes in the declared format
pub fn parse_rsa_public_key(
    bytes: &[u8],
    format: PublicKeyFormat,
) -> Result<RsaPublicKey, KeyError> {
    match format {
        PublicKeyFormat::Pkcs1WithRsa => RsaPublicKey::from_pkcs1_der(bytes)
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string())),
        PublicKeyFormat::Pkix => RsaPublicKey::from_public_key_der(bytes)
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string())),
    }
}

/// Encode an RSA public key in the requested format
pub fn rsa_public_key_to_bytes(
    key: &RsaPublicKey,
    format: PublicKeyFormat,
) -> Result<Vec<u8>, KeyError> {
    let document = match format {
        PublicKeyFormat::Pkcs1WithRsa => key
            .to_pkcs1_der()
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?,
        PublicKeyFormat::Pkix => key
            .to_public_key_der()
            .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?,
    };
    Ok(document.as_bytes().to_vec())
}

/// Sign a SHA-512 digest with a private key
pub fn create_signature(
    private_key: &RsaPrivateKey,
    hash: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<Vec<u8>, KeyError> {
    let result = match algorithm {
        SignatureAlgorithm::Sha512WithRsa => {
            private_key.sign(Pkcs1v15Sign::new::<Sha512>(), hash)
        }
        SignatureAlgorithm::Sha512WithRsaPss => {
            if private_key.size() < MIN_PSS_KEY_BYTES {
                return Err(KeyError::SigningFailed(format!(
                    "{}-bit key is too small for {}",
                    private_key.size() * 8,
                    algorithm
                )));
            }
            private_key.sign_with_rng(&mut OsRng, Pss::new::<Sha512>(), hash)
        }
    };
    result.map_err(|e| KeyError::SigningFailed(e.to_string()))
}

/// Verify a signature over a SHA-512 digest against a public key
pub fn verify_signature(
    public_key: &RsaPublicKey,
    hash: &[u8],
    signature: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<(), KeyError> {
    let result = match algorithm {
        SignatureAlgorithm::Sha512WithRsa => {
            public_key.verify(Pkcs1v15Sign::new::<Sha512>(), hash, signature)
        }
        SignatureAlgorithm::Sha512WithRsaPss => {
            public_key.verify(Pss::new::<Sha512>(), hash, signature)
        }
    };
    result.map_err(|_| KeyError::VerificationFailed)
}

/// Keys shared by tests across the crate, generated once
#[cfg(test)]
pub(crate) fn test_key(index: usize) -> &'static KeyPair {
    use std::sync::OnceLock;

    static KEYS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    &KEYS.get_or_init(|| {
        (0..2)
            .map(|_| KeyPair::generate(2048).expect("test key generation"))
            .collect()
    })[index]
}
