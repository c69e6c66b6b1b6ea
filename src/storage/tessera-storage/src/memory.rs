//! In-memory local user store.
//!
//! Used by the server's development mode and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{LocalUserStore, StorageError};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<String, i64>,
}

/// Volatile [`LocalUserStore`] backed by a map.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    /// Creates an empty store. Ids start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Returns true when no user is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.users.is_empty()
    }
}

#[async_trait]
impl LocalUserStore for MemoryUserStore {
    async fn store_local_user(&self, username: &str) -> Result<i64, StorageError> {
        if username.is_empty() {
            return Err(StorageError::InvalidInput("username cannot be empty".into()));
        }

        let mut inner = self.inner.write().await;
        if inner.users.contains_key(username) {
            return Err(StorageError::AlreadyExists(username.to_string()));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.users.insert(username.to_string(), id);

        debug!(username = %username, id, "Stored local user");
        Ok(id)
    }

    async fn fetch_local_user(&self, username: &str) -> Result<i64, StorageError> {
        self.inner
            .read()
            .await
            .users
            .get(username)
            .copied()
            .ok_or_else(|| StorageError::NotFound(username.to_string()))
    }
}
