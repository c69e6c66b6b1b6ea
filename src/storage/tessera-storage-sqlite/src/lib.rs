//! # Tessera Storage - SQLite Backend
//!
//! SQLite implementation of the local user store. The schema is the single
//! `users` relation: an autoincrement id and a unique username.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use tessera_storage::{LocalUserStore, StorageError};

/// SQLite-backed [`LocalUserStore`].
///
/// The database lives at `{base_path}/{name}.db`.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteUserStore {
    /// Opens or creates the database and applies the schema.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory holding the database file
    /// * `name` - Database name (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is invalid
    /// - The directory cannot be created
    /// - The connection or migration fails
    pub async fn open(base_path: impl AsRef<Path>, name: &str) -> Result<Self, StorageError> {
        Self::validate_name(name)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            StorageError::ConnectionFailed(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{name}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(path = %db_path.display(), "Opening SQLite database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool, db_path };
        store.migrate().await?;

        info!(path = %store.db_path.display(), "SQLite user store ready");

        Ok(store)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_name(name: &str) -> Result<(), StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidInput("database name cannot be empty".into()));
        }

        if name.len() > 64 {
            return Err(StorageError::InvalidInput("database name too long".into()));
        }

        let valid = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidInput(
                "database name must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                username   TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;

        debug!("Migrations complete");

        Ok(())
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before UNIX epoch")
            .as_secs() as i64
    }
}

#[async_trait]
impl LocalUserStore for SqliteUserStore {
    async fn store_local_user(&self, username: &str) -> Result<i64, StorageError> {
        if username.is_empty() {
            return Err(StorageError::InvalidInput("username cannot be empty".into()));
        }

        let result = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
            .bind(username)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StorageError::AlreadyExists(username.to_string())
                },
                other => StorageError::QueryFailed(other.to_string()),
            })?;

        let id = result.last_insert_rowid();
        debug!(username = %username, id, "Stored local user");

        Ok(id)
    }

    async fn fetch_local_user(&self, username: &str) -> Result<i64, StorageError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.map(|(id,)| id)
            .ok_or_else(|| StorageError::NotFound(username.to_string()))
    }
}
