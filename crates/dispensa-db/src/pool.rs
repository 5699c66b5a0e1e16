//! # Connection Pool
//!
//! Opens the SQLite store, applies pragmas and migrations, and hands out
//! units of work.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig ──► Database::new ──► SqlitePool ──► migrations               │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                         db.begin() ──► UnitOfWork                       │
//! │                    (one pooled connection, BEGIN IMMEDIATE)             │
//! │                              ├── uow.orders() / uow.batches() / ...     │
//! │                              └── commit()  or  drop ──► ROLLBACK        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! File-backed stores run in WAL mode with foreign keys on. Writers that
//! find the file locked wait up to `busy_timeout` before failing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::unit_of_work::UnitOfWork;

const MEMORY_PATH: &str = ":memory:";

/// Where the store lives and how many connections it may hold.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, created on first connect. `:memory:` for a private
    /// in-process store.
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Apply pending migrations while connecting.
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            run_migrations: true,
        }
    }

    /// A private store on a single connection that is never recycled; the
    /// data disappears with it.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        options.foreign_keys(true).busy_timeout(self.busy_timeout)
    }
}

/// Shared handle to the store. Clones share one pool.
///
/// Repositories are only reachable through [`Database::begin`], so every
/// write belongs to some unit of work.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening order store"
        );

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Recycling the only connection would drop the database with it
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(in_memory = config.is_in_memory(), "Pool connected");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Idempotent; applied versions are tracked in `_sqlx_migrations`.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a unit of work that may write, on one pooled connection.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so concurrent
    /// writers queue on the busy timeout instead of failing on a lock
    /// upgrade halfway through. Do not begin a second unit of work while
    /// holding the first: on a single-connection pool it waits forever.
    pub async fn begin(&self) -> DbResult<UnitOfWork> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(DbError::from_begin)?;
        Ok(UnitOfWork::new(tx))
    }

    /// Starts a read-only unit of work. Readers never take the write lock,
    /// so they run alongside an open writer.
    pub async fn begin_read(&self) -> DbResult<UnitOfWork> {
        let tx = self.pool.begin().await.map_err(DbError::from_begin)?;
        Ok(UnitOfWork::new(tx))
    }

    pub async fn close(&self) {
        info!("Closing order store");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_writers_queue_and_readers_do_not() {
        let dir = std::env::temp_dir().join(format!("dispensa-db-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = DbConfig::new(dir.join("store.db"))
            .max_connections(3)
            .busy_timeout(Duration::from_millis(200));
        let db = Database::new(config).await.unwrap();

        let writer = db.begin().await.unwrap();

        let mut reader = db.begin_read().await.unwrap();
        assert!(reader.products().list_by_pharmacy("ph-1").await.unwrap().is_empty());
        drop(reader);

        // Holds past the busy timeout, so the second writer gives up
        let err = db.begin().await.unwrap_err();
        assert!(err.is_busy(), "unexpected error: {}", err);

        writer.commit().await.unwrap();
        db.begin().await.unwrap().commit().await.unwrap();

        db.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/dispensa-test.db")
            .max_connections(10)
            .busy_timeout(Duration::from_secs(1))
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());

        let memory = DbConfig::in_memory();
        assert!(memory.is_in_memory());
        assert_eq!(memory.max_connections, 1);
    }
}
