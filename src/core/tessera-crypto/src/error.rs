//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key format or size.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
