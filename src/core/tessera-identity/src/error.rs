//! Identity provider error types.

use tessera_auth::AuthError;
use thiserror::Error;

/// Errors returned by identity provider operations.
///
/// Provider diagnostics are carried verbatim in `reason`. Transport failures
/// are folded into the failure of the operation that was attempted.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Sign-up was rejected.
    #[error("registration failed: {reason}")]
    RegistrationFailed {
        /// Provider message.
        reason: String,
    },

    /// The confirmation code was rejected.
    #[error("confirmation failed: {reason}")]
    ConfirmationFailed {
        /// Provider message.
        reason: String,
    },

    /// A new confirmation code could not be sent.
    #[error("resending confirmation code failed: {reason}")]
    ResendFailed {
        /// Provider message.
        reason: String,
    },

    /// The user lookup failed for a reason other than "not found".
    #[error("existence check failed: {reason}")]
    ExistenceCheckFailed {
        /// Provider message.
        reason: String,
    },

    /// Login was rejected or returned a challenge.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Provider message.
        reason: String,
    },

    /// The account exists but has not been confirmed.
    #[error("user is not confirmed: {reason}")]
    UserNotConfirmed {
        /// Provider message.
        reason: String,
    },

    /// The token failed local verification or was rejected by the provider.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// No published key matches the token's key id.
    #[error("signing key not found: {kid}")]
    KeyNotFound {
        /// Key id from the token header.
        kid: String,
    },

    /// The key set could not be fetched.
    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// The profile could not be fetched.
    #[error("profile unavailable: {0}")]
    ProfileUnavailable(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<AuthError> for IdentityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken(msg) => IdentityError::InvalidToken(msg),
            AuthError::KeyNotFound { kid } => IdentityError::KeyNotFound { kid },
            AuthError::KeySetUnavailable(msg) => IdentityError::KeySetUnavailable(msg),
            AuthError::Configuration(msg) => IdentityError::Configuration(msg),
            AuthError::Cancelled => IdentityError::Cancelled,
        }
    }
}
