//! Local user store trait definition.

use async_trait::async_trait;

use crate::error::StorageError;

/// Username to local id mapping.
///
/// Implementations must enforce username uniqueness and report a second
/// insert of the same username as [`StorageError::AlreadyExists`].
#[async_trait]
pub trait LocalUserStore: Send + Sync {
    /// Stores a username and returns its newly assigned id.
    async fn store_local_user(&self, username: &str) -> Result<i64, StorageError>;

    /// Returns the id stored for a username, or [`StorageError::NotFound`].
    async fn fetch_local_user(&self, username: &str) -> Result<i64, StorageError>;
}
