//! Naming policy applied to claimed aliases

use thiserror::Error;

/// Longest alias accepted by [`DefaultAliasPolicy`]
pub const MAX_ALIAS_LENGTH: usize = 100;

/// Claim validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid alias {alias:?}: {reason}")]
    InvalidAlias { alias: String, reason: String },
}

/// Decides which names may be registered
pub trait AliasPolicy: Send + Sync {
    fn validate(&self, alias: &str) -> Result<(), ValidationError>;
}

/// ASCII alphanumerics plus `.`, `-` and `_`, at most [`MAX_ALIAS_LENGTH`] long
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAliasPolicy;

impl AliasPolicy for DefaultAliasPolicy {
    fn validate(&self, alias: &str) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidAlias {
            alias: alias.to_string(),
            reason,
        };

        if alias.is_empty() {
            return Err(invalid("alias is empty".to_string()));
        }
        if alias.len() > MAX_ALIAS_LENGTH {
            return Err(invalid(format!(
                "alias is longer than {} characters",
                MAX_ALIAS_LENGTH
            )));
        }
        if let Some(c) = alias
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(invalid(format!("character {:?} is not allowed", c)));
        }
        Ok(())
    }
}
