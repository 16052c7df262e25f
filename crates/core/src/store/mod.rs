//! Embedded SQLite store for runs, findings, annotations, and the action log.
//!
//! One writer at a time: the store file is guarded by an advisory lock on a
//! sidecar `.lock` file held for the lifetime of the [`Store`]. All mutating
//! operations take an explicit connection so the sync orchestrator can wrap
//! steps 2–7 in a single transaction.

pub mod actions;
pub mod annotations;
pub mod findings;
pub mod runs;
pub mod schema;
pub mod servers;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs2::FileExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::{AuditError, Result};

pub struct Store {
    pool: SqlitePool,
    /// Held open for the process lifetime; dropping releases the lock.
    _lock: Option<std::fs::File>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if missing) the store at `path` and run migrations.
    ///
    /// Fails with [`AuditError::StoreLocked`] when another process holds the
    /// sidecar lock.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = Self::acquire_file_lock(&path)?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            _lock: Some(lock),
            path: Some(path.clone()),
        };
        store.migrate().await?;
        info!(path = %path.display(), "audit store opened");
        Ok(store)
    }

    /// In-memory store for tests. A single never-recycled connection keeps
    /// the in-memory database alive for the store's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(AuditError::Database)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            _lock: None,
            path: None,
        };
        store.migrate().await?;
        Ok(store)
    }

    fn acquire_file_lock(db_path: &Path) -> Result<std::fs::File> {
        let lock_path = db_path.with_extension("db.lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        file.try_lock_exclusive()
            .map_err(|_| AuditError::StoreLocked {
                path: db_path.display().to_string(),
            })?;
        debug!(path = %lock_path.display(), "store lock acquired");
        Ok(file)
    }

    async fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        schema::migrate(&mut conn).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin the one logical transaction a sync commits atomically.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_migrates() {
        let store = Store::open_in_memory().await.unwrap();
        store.check_health().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let version = schema::current_version(&mut conn).await.unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn second_open_of_same_file_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let first = Store::open(&path).await.unwrap();
        let second = Store::open(&path).await;
        assert!(matches!(second, Err(AuditError::StoreLocked { .. })));
        drop(first);
        let third = Store::open(&path).await;
        assert!(third.is_ok());
    }
}
