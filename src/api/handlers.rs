//! HTTP handlers for alias lookup and registration

use crate::alias::{get_record, list_aliases as collect_aliases, Claim, Registrar, Registration};
use crate::api::error::ApiError;
use crate::core::{timestamp_to_string, Alias, Channel, Record};
use crate::crypto::encode_base64url;
use crate::storage::Cache;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registrar: Arc<Registrar>,
}

impl ApiState {
    pub fn new(registrar: Registrar) -> Self {
        Self {
            registrar: Arc::new(registrar),
        }
    }

    fn channel(&self) -> &Channel {
        self.registrar.channel()
    }

    fn cache(&self) -> &dyn Cache {
        self.registrar.node().cache.as_ref()
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// A resolved alias; empty when no name was asked for
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct AliasView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_format: Option<String>,
}

impl AliasView {
    fn new(record: &Record, alias: &Alias) -> Self {
        Self {
            alias: Some(alias.alias.clone()),
            timestamp: Some(timestamp_to_string(record.timestamp)),
            public_key: Some(encode_base64url(&alias.public_key)),
            public_key_format: Some(alias.public_format.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AliasSummary {
    pub alias: String,
    pub timestamp: String,
    pub public_key: String,
    pub public_key_format: String,
    pub record_hash: String,
    pub block_hash: String,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub alias: String,
    pub timestamp: String,
    pub public_key: String,
    pub record_hash: String,
    pub block_hash: String,
    pub block_length: u64,
}

impl From<&Registration> for RegistrationResponse {
    fn from(registration: &Registration) -> Self {
        Self {
            alias: registration.alias.alias.clone(),
            timestamp: timestamp_to_string(registration.timestamp),
            public_key: encode_base64url(&registration.alias.public_key),
            record_hash: hex::encode(&registration.record_hash),
            block_hash: hex::encode(&registration.block_hash),
            block_length: registration.block_length,
        }
    }
}

/// Pre-filled registration form
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    pub alias: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub channel: String,
    pub length: u64,
    pub head: Option<String>,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AliasQuery {
    pub alias: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /alias - Resolve an alias
pub async fn get_alias(
    State(state): State<ApiState>,
    Query(query): Query<AliasQuery>,
) -> Result<Json<AliasView>, ApiError> {
    let Some(name) = query.alias.filter(|name| !name.is_empty()) else {
        return Ok(Json(AliasView::default()));
    };

    let (record, alias) = get_record(state.channel(), state.cache(), &name)?;
    Ok(Json(AliasView::new(&record, &alias)))
}

/// GET /aliases - List every registration, newest first
pub async fn list_aliases(
    State(state): State<ApiState>,
) -> Result<Json<Vec<AliasSummary>>, ApiError> {
    let entries = collect_aliases(state.channel(), state.cache())?;
    let summaries = entries
        .into_iter()
        .map(|entry| AliasSummary {
            timestamp: timestamp_to_string(entry.record.timestamp),
            public_key: encode_base64url(&entry.alias.public_key),
            public_key_format: entry.alias.public_format.to_string(),
            alias: entry.alias.alias,
            record_hash: hex::encode(&entry.record_hash),
            block_hash: hex::encode(&entry.block_hash),
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /alias-register - Echo pre-filled form data
pub async fn registration_form(Query(form): Query<RegistrationForm>) -> Json<RegistrationForm> {
    Json(form)
}

/// POST /alias-register - Register an alias
pub async fn register_alias(
    State(state): State<ApiState>,
    Form(claim): Form<Claim>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    // Mining stops if the client goes away and this future is dropped
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let registration = state.registrar.register_with_cancel(&claim, &cancel).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse::from(&registration)),
    ))
}

/// GET /health - Liveness and head summary
pub async fn health_check(State(state): State<ApiState>) -> Result<Json<HealthResponse>, ApiError> {
    let channel = state.channel();
    let head = channel.head(state.cache())?;
    Ok(Json(HealthResponse {
        status: "ok",
        channel: channel.name.clone(),
        length: channel.length(state.cache())?,
        head: head.and_then(|r| r.block_hash).map(hex::encode),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Reference, ALIAS_CHANNEL};
    use crate::crypto::keys::test_key;
    use crate::crypto::{KeyPair, PublicKeyFormat, SignatureAlgorithm};
    use crate::network::{Node, NodeConfig};
    use axum::response::IntoResponse;
    use std::time::Duration;

    fn test_node() -> Arc<Node> {
        Arc::new(Node::in_memory(NodeConfig {
            threshold: 0,
            ..Default::default()
        }))
    }

    fn test_state() -> ApiState {
        ApiState::new(Registrar::new(test_node()))
    }

    fn signed_by(name: &str, key: &KeyPair) -> Claim {
        Claim::signed(
            name,
            key,
            PublicKeyFormat::Pkix,
            SignatureAlgorithm::Sha512WithRsaPss,
        )
        .unwrap()
    }

    fn claim(name: &str) -> Claim {
        signed_by(name, test_key(0))
    }

    async fn lookup(state: &ApiState, name: Option<&str>) -> Result<Json<AliasView>, ApiError> {
        get_alias(
            State(state.clone()),
            Query(AliasQuery {
                alias: name.map(str::to_string),
            }),
        )
        .await
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let state = test_state();
        let (status, Json(registered)) =
            register_alias(State(state.clone()), Form(claim("Alice")))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(registered.block_length, 1);

        let Json(view) = lookup(&state, Some("Alice")).await.unwrap();
        assert_eq!(view.alias.as_deref(), Some("Alice"));
        assert_eq!(view.timestamp, Some(registered.timestamp));
        assert_eq!(view.public_key, Some(registered.public_key));

        let Json(all) = list_aliases(State(state.clone())).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].block_hash, registered.block_hash);
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let state = test_state();
        register_alias(State(state.clone()), Form(claim("Alice")))
            .await
            .unwrap();

        let err = register_alias(State(state.clone()), Form(claim("Alice")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_dropped_request_leaves_no_pending_record() {
        let node = test_node();
        // Unreachable difficulty keeps mining until the request goes away
        let stuck = ApiState::new(Registrar::new(node.clone()).with_threshold(64));
        let request = register_alias(State(stuck), Form(claim("Alice")));
        assert!(tokio::time::timeout(Duration::from_millis(300), request)
            .await
            .is_err());

        // Mining is cancelled and the record dropped before the lock is released
        drop(node.lock_channel(ALIAS_CHANNEL).await);
        assert!(node.cache.get_block_entries(ALIAS_CHANNEL).unwrap().is_empty());

        let state = ApiState::new(Registrar::new(node));
        let second = signed_by("Alice", test_key(1));
        let (status, _) = register_alias(State(state.clone()), Form(second))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(all) = list_aliases(State(state)).await.unwrap();
        assert_eq!(all.len(), 1);
        let second_key = test_key(1).public_key_bytes(PublicKeyFormat::Pkix).unwrap();
        assert_eq!(all[0].public_key, encode_base64url(&second_key));
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let state = test_state();
        let mut incomplete = claim("Alice");
        incomplete.public_key = None;

        let err = register_alias(State(state), Form(incomplete)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_lookup_statuses() {
        let state = test_state();

        let Json(view) = lookup(&state, None).await.unwrap();
        assert_eq!(view, AliasView::default());
        let Json(view) = lookup(&state, Some("")).await.unwrap();
        assert_eq!(view, AliasView::default());

        let err = lookup(&state, Some("Nobody")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lookup_storage_failure() {
        let state = test_state();
        state
            .cache()
            .put_head(
                ALIAS_CHANNEL,
                &Reference {
                    timestamp: 1,
                    channel_name: ALIAS_CHANNEL.to_string(),
                    block_hash: Some(vec![3; 64]),
                    record_hash: None,
                },
            )
            .unwrap();

        let err = lookup(&state, Some("Alice")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        // Empty lookups never touch the broken chain
        assert!(lookup(&state, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_registration_form_echo() {
        let form = RegistrationForm {
            alias: Some("Alice".to_string()),
            public_key: Some("AQIDBA".to_string()),
        };
        let Json(echoed) = registration_form(Query(form)).await;
        assert_eq!(echoed.alias.as_deref(), Some("Alice"));
        assert_eq!(echoed.public_key.as_deref(), Some("AQIDBA"));
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let Json(health) = health_check(State(state)).await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.length, 0);
        assert!(health.head.is_none());
    }
}
