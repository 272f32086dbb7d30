//! API error types and responses

use crate::alias::{Aborted, RegistrationError, ResolveError};
use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error(transparent)]
    Registration(#[from] Aborted),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Status and code for a failed registration
fn registration_status(error: &RegistrationError) -> (StatusCode, &'static str) {
    match error {
        RegistrationError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        RegistrationError::AliasAlreadyExists { .. } => (StatusCode::CONFLICT, "ALIAS_EXISTS"),
        RegistrationError::InvalidPublicKey(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PUBLIC_KEY")
        }
        RegistrationError::InvalidSignature(_) => (StatusCode::FORBIDDEN, "INVALID_SIGNATURE"),
        RegistrationError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        RegistrationError::Mining(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MINING_ERROR"),
        RegistrationError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
    }
}

/// Where a registration stopped, plus the existing binding on a conflict
fn registration_details(aborted: &Aborted) -> serde_json::Value {
    let mut details = serde_json::json!({
        "state": aborted.state,
        "failed_at": aborted.failed_at,
    });
    if let RegistrationError::AliasAlreadyExists { existing, .. } = &aborted.error {
        details["alias"] = serde_json::json!(existing.alias);
    }
    details
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            ApiError::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                msg.clone(),
                None,
            ),
            ApiError::InvalidPublicKey(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_PUBLIC_KEY",
                msg.clone(),
                None,
            ),
            ApiError::Registration(aborted) => {
                let (status, code) = registration_status(&aborted.error);
                let details = registration_details(aborted);
                (status, code, aborted.error.to_string(), Some(details))
            }
        };

        if status.is_server_error() {
            log::error!("{}", self);
        }

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(name) => ApiError::NotFound(format!("Alias {} not found", name)),
            ResolveError::Storage(e) => ApiError::Storage(e.to_string()),
            ResolveError::InvalidPublicKey(e) => ApiError::InvalidPublicKey(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{RegistrationState, ValidationError};
    use crate::core::Alias;
    use crate::crypto::PublicKeyFormat;

    fn aborted(error: RegistrationError) -> ApiError {
        ApiError::Registration(Aborted {
            state: RegistrationState::Unique,
            failed_at: RegistrationState::KeyParsed,
            error,
        })
    }

    #[test]
    fn test_details_name_failed_step() {
        let conflict = Aborted {
            state: RegistrationState::Synced,
            failed_at: RegistrationState::Unique,
            error: RegistrationError::AliasAlreadyExists {
                existing: Alias::new("Alice", vec![1, 2], PublicKeyFormat::Pkix),
                timestamp: 1,
            },
        };
        assert_eq!(
            registration_details(&conflict),
            serde_json::json!({ "state": "Synced", "failed_at": "Unique", "alias": "Alice" })
        );

        let forged = Aborted {
            state: RegistrationState::RecordBuilt,
            failed_at: RegistrationState::SignatureVerified,
            error: RegistrationError::InvalidSignature("mismatch".to_string()),
        };
        assert_eq!(
            registration_details(&forged),
            serde_json::json!({ "state": "RecordBuilt", "failed_at": "SignatureVerified" })
        );
    }

    #[test]
    fn test_registration_status_mapping() {
        let cases = [
            (
                aborted(RegistrationError::Validation(ValidationError::MissingField("alias"))),
                StatusCode::BAD_REQUEST,
            ),
            (
                aborted(RegistrationError::InvalidPublicKey("bad".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                aborted(RegistrationError::InvalidSignature("bad".to_string())),
                StatusCode::FORBIDDEN,
            ),
            (
                aborted(RegistrationError::Storage(StorageError::LockPoisoned)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (aborted(RegistrationError::Cancelled), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_resolve_errors() {
        let response = ApiError::from(ResolveError::NotFound("Alice".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            ApiError::from(ResolveError::Storage(StorageError::BlockNotFound("ab".to_string())))
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
