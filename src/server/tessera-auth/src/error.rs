//! Authentication error types.

use thiserror::Error;

/// Errors that can occur while verifying a token or loading signing keys.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is malformed, badly signed, expired, or not meant for us.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// No published key carries the token's key id, even after a refresh.
    #[error("signing key not found: {kid}")]
    KeyNotFound {
        /// Key id taken from the token header.
        kid: String,
    },

    /// The key set could not be fetched or parsed.
    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// Invalid verifier or cache configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}
