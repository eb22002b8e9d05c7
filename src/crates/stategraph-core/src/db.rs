//! SQLite connection handle shared by the checkpoint saver and the memory store

use crate::config::DatabaseConfig;
use crate::error::{GraphError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Owned database connection, opened at engine construction and closed at shutdown
#[derive(Clone, Debug)]
pub struct Database {
    pool: DatabasePool,
}

impl Database {
    /// Open (creating if missing) the database described by `config`.
    ///
    /// The pool uses WAL journaling with `synchronous=FULL` so a committed checkpoint
    /// survives a crash.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = Path::new(&config.path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GraphError::Configuration(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        debug!(path = %path.display(), "Connecting to database");
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| GraphError::StorageUnavailable(e.into()))?;

        info!(path = %path.display(), "Database connection established");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Close every connection; later queries fail
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
