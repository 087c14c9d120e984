//! Error types at each collaborator boundary.
//!
//! Only [`SessionError`] is ever returned to UI collaborators. The others are
//! consumed by the manager's recovery paths and end up in logs.

use thiserror::Error;

/// Persisted credential store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("credential store lock poisoned")]
    Poisoned,
}

/// Identity-provider client failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The persisted refresh credential was rejected (revoked, expired, or
    /// unknown to the provider).
    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(String),

    /// Email/password did not match.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Transport-level failure; the session may still be valid.
    #[error("network error: {0}")]
    Network(String),

    #[error("identity provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Map a raw provider error message onto the taxonomy.
    ///
    /// The hosted provider reports refresh failures as free text
    /// (`"Invalid Refresh Token: Refresh Token Not Found"` and friends).
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("refresh token") || lower.contains("refresh_token") {
            Self::InvalidRefreshToken(message)
        } else if lower.contains("invalid login credentials") {
            Self::InvalidCredentials
        } else {
            Self::Other(message)
        }
    }

    /// Whether the persisted credentials can no longer be trusted.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Self::InvalidRefreshToken(_))
    }
}

/// Profile store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileStoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed profile record: {0}")]
    Decode(String),

    #[error("profile store error: {0}")]
    Other(String),
}

/// Errors surfaced by [`crate::SessionManager`] actions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The refresh breaker tripped; the environment is restarting.
    #[error("session manager halted after a refresh storm")]
    Halted,

    #[error("session manager has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_token_messages_are_credential_errors() {
        let err = ProviderError::from_message("Invalid Refresh Token: Refresh Token Not Found");
        assert!(err.is_invalid_credential());

        let err = ProviderError::from_message("invalid refresh_token grant");
        assert!(err.is_invalid_credential());
    }

    #[test]
    fn other_messages_keep_storage() {
        assert_eq!(
            ProviderError::from_message("Invalid login credentials"),
            ProviderError::InvalidCredentials
        );
        assert!(!ProviderError::from_message("upstream timed out").is_invalid_credential());
        assert!(!ProviderError::Network("reset".into()).is_invalid_credential());
    }

    #[test]
    fn session_error_is_transparent_over_provider() {
        let err: SessionError = ProviderError::InvalidCredentials.into();
        assert_eq!(err.to_string(), "invalid login credentials");
    }
}
