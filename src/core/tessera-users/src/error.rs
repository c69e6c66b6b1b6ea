//! User lifecycle error taxonomy.

use serde::Serialize;
use tessera_identity::IdentityError;
use tessera_storage::StorageError;
use thiserror::Error;

/// Every failure the user lifecycle can report.
#[derive(Debug, Error)]
pub enum UserError {
    /// The provider rejected the sign-up.
    #[error("registration failed: {reason}")]
    RegistrationFailed {
        /// Provider message.
        reason: String,
    },

    /// The provider rejected the confirmation code.
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

    /// The provider could not tell whether the username exists.
    #[error("existence check failed: {reason}")]
    ExistenceCheckFailed {
        /// Provider message.
        reason: String,
    },

    /// Login was rejected.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Provider message.
        reason: String,
    },

    /// Login attempted before confirming the account.
    #[error("user is not confirmed: {reason}")]
    UserNotConfirmed {
        /// Provider message.
        reason: String,
    },

    /// The token is not valid.
    #[error("invalid token: {reason}")]
    InvalidToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// No published key matches the token.
    #[error("signing key not found: {kid}")]
    KeyNotFound {
        /// Key id from the token header.
        kid: String,
    },

    /// The provider's signing keys could not be fetched.
    #[error("key set unavailable: {reason}")]
    KeySetUnavailable {
        /// Fetch failure.
        reason: String,
    },

    /// The user exists at the provider but not in the local store.
    #[error("profile incomplete: no local record for {username}")]
    ProfileIncomplete {
        /// Username with no local record.
        username: String,
    },

    /// The provider profile could not be fetched.
    #[error("profile unavailable: {reason}")]
    ProfileUnavailable {
        /// Provider message.
        reason: String,
    },

    /// The local store already holds this username.
    #[error("local store conflict: {reason}")]
    LocalStoreConflict {
        /// Store message.
        reason: String,
    },

    /// The local store failed.
    #[error("local store unavailable: {reason}")]
    LocalStoreUnavailable {
        /// Store message.
        reason: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Classification of a [`UserError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`UserError::RegistrationFailed`].
    RegistrationFailed,
    /// See [`UserError::ConfirmationFailed`].
    ConfirmationFailed,
    /// See [`UserError::ResendFailed`].
    ResendFailed,
    /// See [`UserError::ExistenceCheckFailed`].
    ExistenceCheckFailed,
    /// See [`UserError::AuthenticationFailed`].
    AuthenticationFailed,
    /// See [`UserError::UserNotConfirmed`].
    UserNotConfirmed,
    /// See [`UserError::InvalidToken`].
    InvalidToken,
    /// See [`UserError::KeyNotFound`].
    KeyNotFound,
    /// See [`UserError::KeySetUnavailable`].
    KeySetUnavailable,
    /// See [`UserError::ProfileIncomplete`].
    ProfileIncomplete,
    /// See [`UserError::ProfileUnavailable`].
    ProfileUnavailable,
    /// See [`UserError::LocalStoreConflict`].
    LocalStoreConflict,
    /// See [`UserError::LocalStoreUnavailable`].
    LocalStoreUnavailable,
    /// See [`UserError::Cancelled`].
    Cancelled,
}

impl ErrorKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RegistrationFailed => "registration_failed",
            ErrorKind::ConfirmationFailed => "confirmation_failed",
            ErrorKind::ResendFailed => "resend_failed",
            ErrorKind::ExistenceCheckFailed => "existence_check_failed",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::UserNotConfirmed => "user_not_confirmed",
            ErrorKind::InvalidToken => "invalid_token",
            ErrorKind::KeyNotFound => "key_not_found",
            ErrorKind::KeySetUnavailable => "key_set_unavailable",
            ErrorKind::ProfileIncomplete => "profile_incomplete",
            ErrorKind::ProfileUnavailable => "profile_unavailable",
            ErrorKind::LocalStoreConflict => "local_store_conflict",
            ErrorKind::LocalStoreUnavailable => "local_store_unavailable",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UserError {
    /// Returns the error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UserError::RegistrationFailed { .. } => ErrorKind::RegistrationFailed,
            UserError::ConfirmationFailed { .. } => ErrorKind::ConfirmationFailed,
            UserError::ResendFailed { .. } => ErrorKind::ResendFailed,
            UserError::ExistenceCheckFailed { .. } => ErrorKind::ExistenceCheckFailed,
            UserError::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            UserError::UserNotConfirmed { .. } => ErrorKind::UserNotConfirmed,
            UserError::InvalidToken { .. } => ErrorKind::InvalidToken,
            UserError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            UserError::KeySetUnavailable { .. } => ErrorKind::KeySetUnavailable,
            UserError::ProfileIncomplete { .. } => ErrorKind::ProfileIncomplete,
            UserError::ProfileUnavailable { .. } => ErrorKind::ProfileUnavailable,
            UserError::LocalStoreConflict { .. } => ErrorKind::LocalStoreConflict,
            UserError::LocalStoreUnavailable { .. } => ErrorKind::LocalStoreUnavailable,
            UserError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<IdentityError> for UserError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::RegistrationFailed { reason } => UserError::RegistrationFailed { reason },
            IdentityError::ConfirmationFailed { reason } => UserError::ConfirmationFailed { reason },
            IdentityError::ResendFailed { reason } => UserError::ResendFailed { reason },
            IdentityError::ExistenceCheckFailed { reason } => {
                UserError::ExistenceCheckFailed { reason }
            },
            IdentityError::AuthenticationFailed { reason } => {
                UserError::AuthenticationFailed { reason }
            },
            IdentityError::UserNotConfirmed { reason } => UserError::UserNotConfirmed { reason },
            IdentityError::InvalidToken(reason) => UserError::InvalidToken { reason },
            IdentityError::KeyNotFound { kid } => UserError::KeyNotFound { kid },
            IdentityError::KeySetUnavailable(reason) => UserError::KeySetUnavailable { reason },
            IdentityError::ProfileUnavailable(reason) => UserError::ProfileUnavailable { reason },
            // Only raised while building a client; the key set is the
            // provider dependency that was misconfigured.
            IdentityError::Configuration(reason) => UserError::KeySetUnavailable { reason },
            IdentityError::Cancelled => UserError::Cancelled,
        }
    }
}

impl From<StorageError> for UserError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(reason) => UserError::LocalStoreConflict { reason },
            StorageError::NotFound(username) => UserError::ProfileIncomplete { username },
            other => UserError::LocalStoreUnavailable {
                reason: other.to_string(),
            },
        }
    }
}
