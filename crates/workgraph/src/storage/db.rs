//! Connection and transaction management.
//!
//! [`Database`] wraps a `SqlitePool`. Services open one transaction per
//! mutation with [`Database::begin`]; on success they commit, on any
//! failure they roll back through [`rollback_quietly`] (a rollback failure
//! is logged and never masks the original error) and let the error
//! propagate. Dropping an uncommitted transaction also rolls back, which
//! is how caller cancellation before commit is honored.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::errors::DbError;
use crate::storage::schema;
use workgraph_api::DomainResult;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the configured database file and apply
    /// first-run DDL.
    pub async fn open(config: &StorageConfig) -> DomainResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(DbError::from)?;

        schema::init_schema(&pool).await?;
        info!(path = %config.database_path.display(), "database opened");

        Ok(Self { pool })
    }

    /// Open an in-memory database.
    ///
    /// The pool is pinned to a single connection that is never reaped:
    /// each SQLite `:memory:` connection is its own database, so a second
    /// connection would see empty tables.
    pub async fn in_memory() -> DomainResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::from)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::from)?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction. One connection is held until commit or
    /// rollback; nested transactions are not used.
    pub async fn begin(&self) -> DomainResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await.map_err(DbError::from)?)
    }
}

/// Roll a transaction back, demoting a rollback failure to a warning so it
/// cannot shadow the error that caused the rollback.
pub(crate) async fn rollback_quietly(tx: Transaction<'static, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "transaction rollback failed");
    }
}
