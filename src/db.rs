//! Document store connections.
//!
//! Every tool invocation and every ingestion run opens its own connection
//! and drops it when done; there is no pool and no process-wide handle.
//! Dropping a [`DbConnection`] closes the socket (or file handle), so the
//! connection is released on every exit path. [`DbConnection::close`] is
//! the graceful variant for the success path.
//!
//! Two dialects are supported:
//!
//! - **MySQL**: the production store, configured from `DB_*` variables.
//! - **SQLite**: a local file, for development and tests. The file and its
//!   parent directories are created if missing and WAL mode is enabled.

use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{MySqlSettings, StoreBackend};

/// Upper bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An open connection to either store dialect.
pub enum DbConnection {
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

impl DbConnection {
    /// Close the connection, flushing any protocol-level goodbye.
    pub async fn close(self) -> Result<()> {
        match self {
            Self::MySql(conn) => conn.close().await?,
            Self::Sqlite(conn) => conn.close().await?,
        }
        Ok(())
    }
}

/// Open a fresh connection to the configured store.
pub async fn connect(backend: &StoreBackend) -> Result<DbConnection> {
    let fut = async {
        let conn = match backend {
            StoreBackend::MySql(settings) => DbConnection::MySql(connect_mysql(settings).await?),
            StoreBackend::Sqlite(path) => DbConnection::Sqlite(connect_sqlite(path).await?),
        };
        Ok::<_, anyhow::Error>(conn)
    };

    tokio::time::timeout(CONNECT_TIMEOUT, fut)
        .await
        .with_context(|| {
            format!(
                "timed out after {}s connecting to {}",
                CONNECT_TIMEOUT.as_secs(),
                backend.describe()
            )
        })?
}

async fn connect_mysql(settings: &MySqlSettings) -> Result<MySqlConnection> {
    let options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.database);

    let conn = options
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", settings))?;
    Ok(conn)
}

async fn connect_sqlite(db_path: &Path) -> Result<SqliteConnection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let conn = options
        .connect()
        .await
        .with_context(|| format!("failed to open sqlite:{}", db_path.display()))?;
    Ok(conn)
}
