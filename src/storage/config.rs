use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use super::StoreError;

/// Connection settings for the backing SQLite database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// e.g. `sqlite:ledgerbank.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a statement waits on another writer before failing as busy
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection
    pub acquire_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ledgerbank.db".to_string(),
            max_connections: 10,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: false,
        }
    }
}

impl StoreConfig {
    /// Settings for a database file at `path`.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Open a connection pool with these settings.
    ///
    /// Write-ahead logging lets readers proceed while a transfer holds the
    /// write lock; foreign keys are enforced on every connection.
    pub async fn connect(&self) -> Result<SqlitePool, StoreError> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(options)
            .await?;

        tracing::debug!(
            url = %self.database_url,
            max_connections = self.max_connections,
            "connected to ledger database"
        );
        Ok(pool)
    }
}
