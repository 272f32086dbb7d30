//! Alias registration
//!
//! A claim moves through a fixed sequence of states:
//!
//! ```text
//! ReceivedClaim -> FieldsValidated -> NameValidated -> Synced -> Unique
//!   -> KeyParsed -> RecordBuilt -> SignatureVerified -> Written -> Mined
//!   -> Propagated
//! ```
//!
//! Any failing step aborts the flow with an [`Aborted`] naming the step that
//! failed and the last state reached. Every check that can reject a claim runs before the record
//! is written, and nothing becomes visible to readers until the block holding
//! the record is mined. Pulling before the check and pushing after mining are
//! best effort.

use crate::alias::policy::{AliasPolicy, DefaultAliasPolicy, ValidationError};
use crate::alias::uniqueness::{UniquenessChecker, UniquenessError};
use crate::core::{Alias, Channel, Hash, Record, Reference, ALIAS_CHANNEL, LIVE_FLAG};
use crate::crypto::{
    decode_base64url, encode_base64url, hash, parse_rsa_public_key, verify_signature, KeyError,
    KeyPair, PublicKeyFormat, SignatureAlgorithm,
};
use crate::mining::{LogMiningListener, MinedBlock, MiningError, MiningListener};
use crate::network::Node;
use crate::storage::{write_record, Cache, StorageError};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A self-signed request to bind a name to a public key
///
/// Fields arrive as text, typically from a form. Keys and signatures are
/// base64url without padding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub alias: Option<String>,
    pub public_key: Option<String>,
    pub public_key_format: Option<String>,
    pub signature: Option<String>,
    pub signature_algorithm: Option<String>,
}

impl Claim {
    /// Build a claim for `name` signed by `key`
    pub fn signed(
        name: &str,
        key: &KeyPair,
        format: PublicKeyFormat,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self, KeyError> {
        let public_key = key.public_key_bytes(format)?;
        let alias = Alias::new(name, public_key, format);
        let digest = alias
            .signing_hash()
            .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
        let signature = key.sign(&digest, algorithm)?;

        Ok(Self {
            alias: Some(name.to_string()),
            public_key: Some(encode_base64url(&alias.public_key)),
            public_key_format: Some(format.to_string()),
            signature: Some(encode_base64url(&signature)),
            signature_algorithm: Some(algorithm.to_string()),
        })
    }
}

/// Progress of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    ReceivedClaim,
    FieldsValidated,
    NameValidated,
    Synced,
    Unique,
    KeyParsed,
    RecordBuilt,
    SignatureVerified,
    Written,
    Mined,
    Propagated,
}

impl RegistrationState {
    /// The state that follows this one, if any
    pub fn next(self) -> Option<Self> {
        use RegistrationState::*;
        Some(match self {
            ReceivedClaim => FieldsValidated,
            FieldsValidated => NameValidated,
            NameValidated => Synced,
            Synced => Unique,
            Unique => KeyParsed,
            KeyParsed => RecordBuilt,
            RecordBuilt => SignatureVerified,
            SignatureVerified => Written,
            Written => Mined,
            Mined => Propagated,
            Propagated => return None,
        })
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reasons a registration fails
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Alias {} already registered", existing.alias)]
    AliasAlreadyExists { existing: Alias, timestamp: u64 },
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Mining error: {0}")]
    Mining(MiningError),
    #[error("Registration cancelled")]
    Cancelled,
}

impl From<UniquenessError> for RegistrationError {
    fn from(e: UniquenessError) -> Self {
        match e {
            UniquenessError::AliasAlreadyExists { existing, timestamp } => {
                RegistrationError::AliasAlreadyExists { existing, timestamp }
            }
            UniquenessError::Storage(e) => RegistrationError::Storage(e),
        }
    }
}

impl From<MiningError> for RegistrationError {
    fn from(e: MiningError) -> Self {
        match e {
            MiningError::Cancelled => RegistrationError::Cancelled,
            other => RegistrationError::Mining(other),
        }
    }
}

/// A registration that stopped before completing
#[derive(Error, Debug)]
#[error("Registration aborted at {failed_at}: {error}")]
pub struct Aborted {
    /// Last state reached
    pub state: RegistrationState,
    /// Step that failed, the one after `state`
    pub failed_at: RegistrationState,
    #[source]
    pub error: RegistrationError,
}

/// A completed registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub alias: Alias,
    pub record_hash: Hash,
    pub block_hash: Hash,
    pub block_length: u64,
    /// Record creation time in nanoseconds
    pub timestamp: u64,
    /// Pending-record receipt issued when the record was written
    pub receipt: Reference,
}

/// Tracks the current state and turns errors into [`Aborted`]
struct Flow<'a> {
    name: String,
    state: RegistrationState,
    cancel: &'a CancellationToken,
}

impl<'a> Flow<'a> {
    fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            name: String::new(),
            state: RegistrationState::ReceivedClaim,
            cancel,
        }
    }

    /// Move to `next` unless cancelled
    fn advance(&mut self, next: RegistrationState) -> Result<(), Aborted> {
        if self.cancel.is_cancelled() {
            return Err(self.abort(RegistrationError::Cancelled));
        }
        self.complete(next);
        Ok(())
    }

    /// Move to `next` unconditionally; used once the record is committed
    fn complete(&mut self, next: RegistrationState) {
        log::debug!("Registration of {:?}: {} -> {}", self.name, self.state, next);
        self.state = next;
    }

    fn abort(&self, error: impl Into<RegistrationError>) -> Aborted {
        let error = error.into();
        let failed_at = self.state.next().unwrap_or(self.state);
        log::info!(
            "Registration of {:?} aborted at {}: {}",
            self.name,
            failed_at,
            error
        );
        Aborted {
            state: self.state,
            failed_at,
            error,
        }
    }
}

/// Claim fields once checked to be present
struct Fields<'c> {
    alias: &'c str,
    public_key: &'c str,
    public_key_format: &'c str,
    signature: &'c str,
    signature_algorithm: &'c str,
}

fn required<'c>(
    value: &'c Option<String>,
    field: &'static str,
) -> Result<&'c str, ValidationError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn validate_fields(claim: &Claim) -> Result<Fields<'_>, ValidationError> {
    Ok(Fields {
        alias: required(&claim.alias, "alias")?,
        public_key: required(&claim.public_key, "publicKey")?,
        public_key_format: required(&claim.public_key_format, "publicKeyFormat")?,
        signature: required(&claim.signature, "signature")?,
        signature_algorithm: required(&claim.signature_algorithm, "signatureAlgorithm")?,
    })
}

/// Decoded key and signature material of a claim
struct Credentials {
    public_key: Vec<u8>,
    format: PublicKeyFormat,
    key: RsaPublicKey,
    signature: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

fn parse_credentials(fields: &Fields<'_>) -> Result<Credentials, RegistrationError> {
    let format: PublicKeyFormat = fields
        .public_key_format
        .parse()
        .map_err(|e: KeyError| RegistrationError::InvalidPublicKey(e.to_string()))?;
    let public_key = decode_base64url(fields.public_key)
        .map_err(|e| RegistrationError::InvalidPublicKey(format!("bad encoding: {}", e)))?;
    let key = parse_rsa_public_key(&public_key, format)
        .map_err(|e| RegistrationError::InvalidPublicKey(e.to_string()))?;

    let algorithm: SignatureAlgorithm = fields
        .signature_algorithm
        .parse()
        .map_err(|e: KeyError| RegistrationError::InvalidSignature(e.to_string()))?;
    let signature = decode_base64url(fields.signature)
        .map_err(|e| RegistrationError::InvalidSignature(format!("bad encoding: {}", e)))?;

    Ok(Credentials {
        public_key,
        format,
        key,
        signature,
        algorithm,
    })
}

/// Drives claims through registration on a node
pub struct Registrar {
    node: Arc<Node>,
    channel: Channel,
    threshold: u32,
    listener: Arc<dyn MiningListener>,
    policy: Arc<dyn AliasPolicy>,
    live_flag: Option<String>,
}

impl Registrar {
    /// Registrar for the alias channel at the node's threshold
    pub fn new(node: Arc<Node>) -> Self {
        let channel = node.channel(ALIAS_CHANNEL);
        let threshold = node.config.threshold;
        Self {
            node,
            channel,
            threshold,
            listener: Arc::new(LogMiningListener),
            policy: Arc::new(DefaultAliasPolicy),
            live_flag: None,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn MiningListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AliasPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Value recorded under `LIVE` in each record's metadata
    pub fn with_live_flag(mut self, live_flag: Option<String>) -> Self {
        self.live_flag = live_flag;
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Register a claim
    pub async fn register(&self, claim: &Claim) -> Result<Registration, Aborted> {
        self.register_with_cancel(claim, &CancellationToken::new())
            .await
    }

    /// Register a claim, stopping early once `cancel` fires
    ///
    /// Cancellation is honoured between steps and while mining. Once the
    /// block is mined the registration is committed and runs to completion.
    pub async fn register_with_cancel(
        &self,
        claim: &Claim,
        cancel: &CancellationToken,
    ) -> Result<Registration, Aborted> {
        use RegistrationState::*;

        let mut flow = Flow::new(cancel);
        let cache = self.node.cache.as_ref();

        let fields = validate_fields(claim).map_err(|e| flow.abort(e))?;
        flow.name = fields.alias.to_string();
        flow.advance(FieldsValidated)?;

        self.policy
            .validate(fields.alias)
            .map_err(|e| flow.abort(e))?;
        flow.advance(NameValidated)?;

        if let Err(e) = self.node.pull(&self.channel).await {
            log::warn!(
                "Pull of {} before registering {:?} failed: {}",
                self.channel.name,
                fields.alias,
                e
            );
        }
        flow.advance(Synced)?;

        UniquenessChecker::new(self.channel.clone())
            .check_synced(cache, fields.alias)
            .map_err(|e| flow.abort(e))?;
        flow.advance(Unique)?;

        let credentials = parse_credentials(&fields).map_err(|e| flow.abort(e))?;
        flow.advance(KeyParsed)?;

        let alias = Alias::new(fields.alias, credentials.public_key, credentials.format);
        let mut record = Record::for_alias(&alias, credentials.signature, credentials.algorithm)
            .map_err(|e| flow.abort(StorageError::from(e)))?;
        if let Some(live) = &self.live_flag {
            record.meta.insert(LIVE_FLAG.to_string(), live.clone());
        }
        flow.advance(RecordBuilt)?;

        verify_signature(
            &credentials.key,
            &hash(&record.payload),
            &record.signature,
            record.signature_algorithm,
        )
        .map_err(|e| flow.abort(RegistrationError::InvalidSignature(e.to_string())))?;
        flow.advance(SignatureVerified)?;

        let timestamp = record.timestamp;
        let committing = tokio::spawn(commit(
            self.node.clone(),
            self.channel.clone(),
            self.threshold,
            self.listener.clone(),
            record,
            cancel.clone(),
        ));
        let committed = committing
            .await
            .map_err(|e| flow.abort(RegistrationError::Mining(MiningError::Task(e.to_string()))))?;

        let (receipt, mined) = match committed {
            Ok(Committed { receipt, mined }) => (receipt, mined),
            Err(CommitError::NotWritten(e)) => return Err(flow.abort(e)),
            Err(CommitError::NotMined(e)) => {
                flow.complete(Written);
                return Err(flow.abort(e));
            }
        };
        flow.complete(Written);
        flow.complete(Mined);

        if let Err(e) = self.node.push(&self.channel).await {
            log::warn!(
                "Push of {} after registering {:?} failed: {}",
                self.channel.name,
                alias.alias,
                e
            );
        }
        flow.complete(Propagated);

        log::info!(
            "Registered alias {:?} in block {} (length {})",
            alias.alias,
            &hex::encode(&mined.hash)[..16],
            mined.block.length
        );

        Ok(Registration {
            record_hash: receipt.record_hash.clone().unwrap_or_default(),
            alias,
            block_hash: mined.hash,
            block_length: mined.block.length,
            timestamp,
            receipt,
        })
    }
}

/// A record that made it into a mined block
struct Committed {
    receipt: Reference,
    mined: MinedBlock,
}

enum CommitError {
    NotWritten(StorageError),
    NotMined(RegistrationError),
}

/// Write a verified record, mine it and discard it again if mining fails
///
/// Runs as its own task holding the channel lock, so the pending record is
/// always mined or removed even when the registering caller goes away.
async fn commit(
    node: Arc<Node>,
    channel: Channel,
    threshold: u32,
    listener: Arc<dyn MiningListener>,
    record: Record,
    cancel: CancellationToken,
) -> Result<Committed, CommitError> {
    let _guard = node.lock_channel(&channel.name).await;

    let receipt =
        write_record(&channel.name, node.cache.as_ref(), record).map_err(CommitError::NotWritten)?;

    let mined = if cancel.is_cancelled() {
        Err(MiningError::Cancelled)
    } else {
        node.mine(&channel, threshold, listener, cancel).await
    };

    match mined {
        Ok(mined) => Ok(Committed { receipt, mined }),
        Err(e) => {
            discard(node.cache.as_ref(), &channel.name, &receipt);
            Err(CommitError::NotMined(e.into()))
        }
    }
}

/// Drop a pending record whose block was never mined
fn discard(cache: &dyn Cache, channel: &str, receipt: &Reference) {
    let Some(record_hash) = &receipt.record_hash else {
        return;
    };
    if let Err(e) = cache.remove_block_entry(channel, record_hash) {
        log::warn!(
            "Failed to discard pending record {}: {}",
            hex::encode(record_hash),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::resolver::{get_record, list_aliases};
    use crate::crypto::keys::test_key;
    use crate::network::NodeConfig;
    use std::time::Duration;

    fn test_node() -> Arc<Node> {
        Arc::new(Node::in_memory(NodeConfig {
            threshold: 0,
            ..Default::default()
        }))
    }

    fn alice(algorithm: SignatureAlgorithm) -> Claim {
        Claim::signed("Alice", test_key(0), PublicKeyFormat::Pkix, algorithm).unwrap()
    }

    /// Cancels the registration as soon as mining begins
    struct CancelOnStart(CancellationToken);

    impl MiningListener for CancelOnStart {
        fn on_mining_started(&self, _channel: &str, _size: usize) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registrar = Registrar::new(test_node()).with_threshold(2);

        let registration = registrar
            .register(&alice(SignatureAlgorithm::Sha512WithRsaPss))
            .await
            .unwrap();
        assert_eq!(registration.alias.alias, "Alice");
        assert_eq!(registration.block_length, 1);

        let cache = registrar.node().cache.as_ref();
        let (record, alias) = get_record(registrar.channel(), cache, "Alice").unwrap();
        assert_eq!(record.timestamp, registration.timestamp);
        assert_eq!(record.creator, "Alice");
        assert_eq!(
            alias.public_key,
            test_key(0).public_key_bytes(PublicKeyFormat::Pkix).unwrap()
        );
        assert!(cache.get_block_entries(ALIAS_CHANNEL).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pkcs1_key_with_pkcs1v15_signature() {
        let registrar = Registrar::new(test_node());
        let claim = Claim::signed(
            "bob",
            test_key(0),
            PublicKeyFormat::Pkcs1WithRsa,
            SignatureAlgorithm::Sha512WithRsa,
        )
        .unwrap();
        assert!(registrar.register(&claim).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_field() {
        let registrar = Registrar::new(test_node());
        let mut claim = alice(SignatureAlgorithm::Sha512WithRsa);
        claim.signature = Some(String::new());

        let aborted = registrar.register(&claim).await.unwrap_err();
        assert_eq!(aborted.state, RegistrationState::ReceivedClaim);
        assert_eq!(aborted.failed_at, RegistrationState::FieldsValidated);
        assert!(matches!(
            aborted.error,
            RegistrationError::Validation(ValidationError::MissingField("signature"))
        ));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_crypto() {
        let registrar = Registrar::new(test_node());
        let claim = Claim {
            alias: Some("not a name".to_string()),
            public_key: Some("garbage".to_string()),
            public_key_format: Some("PKIX".to_string()),
            signature: Some("garbage".to_string()),
            signature_algorithm: Some("SHA512WITHRSA".to_string()),
        };

        let aborted = registrar.register(&claim).await.unwrap_err();
        assert_eq!(aborted.state, RegistrationState::FieldsValidated);
        assert_eq!(aborted.failed_at, RegistrationState::NameValidated);
        assert!(matches!(
            aborted.error,
            RegistrationError::Validation(ValidationError::InvalidAlias { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_fails_at_unique() {
        let registrar = Registrar::new(test_node());
        registrar
            .register(&alice(SignatureAlgorithm::Sha512WithRsa))
            .await
            .unwrap();

        let aborted = registrar
            .register(&alice(SignatureAlgorithm::Sha512WithRsaPss))
            .await
            .unwrap_err();
        assert_eq!(aborted.state, RegistrationState::Synced);
        assert_eq!(aborted.failed_at, RegistrationState::Unique);
        assert!(matches!(aborted.error, RegistrationError::AliasAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_unknown_signature_algorithm() {
        let registrar = Registrar::new(test_node());
        let mut claim = alice(SignatureAlgorithm::Sha512WithRsa);
        claim.signature_algorithm = Some("MD5WITHRSA".to_string());

        let aborted = registrar.register(&claim).await.unwrap_err();
        assert_eq!(aborted.state, RegistrationState::Unique);
        assert_eq!(aborted.failed_at, RegistrationState::KeyParsed);
        assert!(matches!(aborted.error, RegistrationError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn test_mismatched_algorithm_fails_verification() {
        let registrar = Registrar::new(test_node());
        let mut claim = alice(SignatureAlgorithm::Sha512WithRsa);
        claim.signature_algorithm = Some("SHA512WITHRSA_PSS".to_string());

        let aborted = registrar.register(&claim).await.unwrap_err();
        assert_eq!(aborted.state, RegistrationState::RecordBuilt);
        assert_eq!(aborted.failed_at, RegistrationState::SignatureVerified);
        assert!(matches!(aborted.error, RegistrationError::InvalidSignature(_)));

        let cache = registrar.node().cache.as_ref();
        assert!(cache.get_block_entries(ALIAS_CHANNEL).unwrap().is_empty());
        assert!(registrar.channel().head(cache).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_flag_recorded() {
        let registrar = Registrar::new(test_node()).with_live_flag(Some("true".to_string()));
        registrar
            .register(&alice(SignatureAlgorithm::Sha512WithRsa))
            .await
            .unwrap();

        let entries = list_aliases(registrar.channel(), registrar.node().cache.as_ref()).unwrap();
        assert_eq!(
            entries[0].record.meta.get(LIVE_FLAG).map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registrar = Registrar::new(test_node());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let aborted = registrar
            .register_with_cancel(&alice(SignatureAlgorithm::Sha512WithRsa), &cancel)
            .await
            .unwrap_err();
        assert_eq!(aborted.state, RegistrationState::ReceivedClaim);
        assert!(matches!(aborted.error, RegistrationError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_mining_discards_pending_record() {
        let cancel = CancellationToken::new();
        let registrar = Registrar::new(test_node())
            .with_listener(Arc::new(CancelOnStart(cancel.clone())));

        let aborted = registrar
            .register_with_cancel(&alice(SignatureAlgorithm::Sha512WithRsa), &cancel)
            .await
            .unwrap_err();
        assert_eq!(aborted.state, RegistrationState::Written);
        assert_eq!(aborted.failed_at, RegistrationState::Mined);
        assert!(matches!(aborted.error, RegistrationError::Cancelled));

        let cache = registrar.node().cache.as_ref();
        assert!(cache.get_block_entries(ALIAS_CHANNEL).unwrap().is_empty());
        assert!(list_aliases(registrar.channel(), cache).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_registration_is_discarded() {
        let node = test_node();
        // Unreachable difficulty keeps the miner busy until cancelled
        let stuck = Registrar::new(node.clone()).with_threshold(64);
        let cancel = CancellationToken::new();
        {
            let _cancel_on_drop = cancel.clone().drop_guard();
            let claim = alice(SignatureAlgorithm::Sha512WithRsa);
            let pending = stuck.register_with_cancel(&claim, &cancel);
            assert!(tokio::time::timeout(Duration::from_millis(300), pending)
                .await
                .is_err());
        }

        // The mining task settles the record before releasing the lock
        drop(node.lock_channel(ALIAS_CHANNEL).await);
        assert!(node.cache.get_block_entries(ALIAS_CHANNEL).unwrap().is_empty());

        let second = Claim::signed(
            "Alice",
            test_key(1),
            PublicKeyFormat::Pkix,
            SignatureAlgorithm::Sha512WithRsa,
        )
        .unwrap();
        Registrar::new(node.clone()).register(&second).await.unwrap();

        let entries = list_aliases(&node.channel(ALIAS_CHANNEL), node.cache.as_ref()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].alias.public_key,
            test_key(1).public_key_bytes(PublicKeyFormat::Pkix).unwrap()
        );
    }

    #[test]
    fn test_state_display_and_order() {
        assert_eq!(RegistrationState::SignatureVerified.to_string(), "SignatureVerified");
        assert_eq!(
            RegistrationState::Synced.next(),
            Some(RegistrationState::Unique)
        );
        assert_eq!(RegistrationState::Propagated.next(), None);
    }
}
