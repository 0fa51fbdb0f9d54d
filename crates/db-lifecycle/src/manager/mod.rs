//! Database manager contract and engine dispatch.
//!
//! This module defines the primary abstraction of the crate:
//!
//! - [`DatabaseManager`]: the operation contract every engine implements
//! - [`DatabaseManagerImpl`]: enum-based static dispatch over the engines
//! - [`SeedFn`]: seed routines consumed by [`DatabaseManager::populate_db`]
//!
//! # Architecture
//!
//! Engines implement the trait; operations an engine cannot express keep the
//! default bodies, which fail explicitly naming the operation and the
//! dialect. The shared operations (migrations, schema version, seeding) have
//! default implementations written against [`TenantConn`], so every engine
//! gets them by providing [`DatabaseManager::tenant`].
//!
//! # enum dispatch
//!
//! [`DatabaseManagerImpl`] provides zero-cost polymorphism: the compiler
//! generates match statements instead of vtable dispatch. Boxing a
//! `dyn DatabaseManager` works too when object storage is more convenient.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlManager;
pub use postgres::PostgresManager;
pub use sqlite::SqliteManager;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::Config;
use crate::conn::TenantConn;
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::migrate;

/// A seed routine: an async callable over a live tenant connection.
///
/// [`DatabaseManager::populate_db`] runs each routine inside its own
/// transaction, in list order.
pub type SeedFn =
    Box<dyn for<'a> Fn(&'a mut TenantConn) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Administrative operations over one managed database.
///
/// A manager owns at most one privileged master session (established lazily,
/// torn down by [`close`](DatabaseManager::close), re-established on demand
/// afterwards) and one memoized tenant pool for the shared operations.
/// Operations a dialect cannot express fail with
/// [`DbError::Unsupported`] naming the operation and the dialect.
#[async_trait]
pub trait DatabaseManager: Send + Sync {
    /// The engine this manager drives.
    fn dialect(&self) -> Dialect;

    /// The configuration this manager was built from.
    fn config(&self) -> &Config;

    /// Get a live session against the managed database from the memoized
    /// tenant pool, constructing the pool on first use.
    async fn tenant(&self) -> Result<TenantConn>;

    /// Ensure the configured application user exists on the server.
    ///
    /// Only meaningful on MySQL, where a freshly created database needs an
    /// owner to grant privileges to.
    async fn create_db_owner_if_not_exists(&self) -> Result<()> {
        Err(DbError::unsupported(
            "create_db_owner_if_not_exists",
            self.dialect().name(),
        ))
    }

    /// Create a database through the master session.
    ///
    /// `name` defaults to the configured database. The collation candidates
    /// from admin configuration are attempted in order; the first success
    /// wins and the last failure propagates when all of them fail. An empty
    /// candidate list performs a single attempt with the engine default.
    /// Creating a database that already exists surfaces the engine's own
    /// error.
    async fn create_db(&self, name: Option<&str>) -> Result<()> {
        let _ = name;
        Err(DbError::unsupported("create_db", self.dialect().name()))
    }

    /// Drop a database if it exists. Dropping a missing database succeeds.
    async fn drop_db(&self, name: Option<&str>) -> Result<()> {
        let _ = name;
        Err(DbError::unsupported("drop_db", self.dialect().name()))
    }

    /// Copy a database. PostgreSQL only (template-based copy); the source
    /// must have no active connections.
    async fn copy_db(&self, from: &str, to: &str) -> Result<()> {
        let _ = (from, to);
        Err(DbError::unsupported("copy_db", self.dialect().name()))
    }

    /// Empty every user table except the migration bookkeeping table and
    /// `ignore_tables`, resetting identity counters. Table names come from
    /// the metadata cache; zero targets is a successful no-op.
    async fn truncate_db(&self, ignore_tables: &[&str]) -> Result<()> {
        let _ = ignore_tables;
        Err(DbError::unsupported("truncate_db", self.dialect().name()))
    }

    /// Resynchronize serial sequences of `id` columns so the next insert
    /// gets `max(id) + 1`, clamped below by each sequence's configured
    /// minimum. PostgreSQL only.
    async fn update_id_sequences(&self) -> Result<()> {
        Err(DbError::unsupported(
            "update_id_sequences",
            self.dialect().name(),
        ))
    }

    /// Drop the metadata caches (table names, id sequences) so the next
    /// operation re-reads the catalog. Needed after schema changes that
    /// happen outside [`migrate_db`](DatabaseManager::migrate_db).
    async fn invalidate_metadata_cache(&self) {}

    /// Apply pending migrations from the configured directory; returns how
    /// many were applied by this call.
    async fn migrate_db(&self) -> Result<usize> {
        let connection = &self.config().connection;
        let dir = connection.migrations_directory.clone().ok_or_else(|| {
            DbError::Config("connection.migrations_directory is not set".to_string())
        })?;
        let table = connection.migrations_table_name.clone();
        let mut conn = self.tenant().await?;
        migrate::migrate_to_latest(&mut conn, &table, &dir).await
    }

    /// Report the schema version: `"none"` before the first migration,
    /// otherwise the numeric prefix of the newest applied migration.
    async fn db_version(&self) -> Result<String> {
        let table = self.config().connection.migrations_table_name.clone();
        let mut conn = self.tenant().await?;
        migrate::current_version(&mut conn, &table).await
    }

    /// Run seed routines in order, each inside its own transaction on the
    /// same tenant session. The first failure rolls back and aborts the
    /// batch with [`DbError::Seed`] carrying the failing index.
    async fn populate_db(&self, seeds: &[SeedFn]) -> Result<()> {
        if seeds.is_empty() {
            debug!("no seed routines to run");
            return Ok(());
        }
        let mut conn = self.tenant().await?;
        for (index, seed) in seeds.iter().enumerate() {
            if let Err(e) = run_seed(&mut conn, seed).await {
                let _ = conn.batch_execute("ROLLBACK").await;
                return Err(DbError::Seed {
                    index,
                    source: Box::new(e),
                });
            }
        }
        info!(count = seeds.len(), "seed routines completed");
        Ok(())
    }

    /// Tear down the master session and the memoized tenant pool.
    ///
    /// Safe to call repeatedly and before anything was opened; teardown
    /// failures are logged and swallowed. The manager stays usable: the next
    /// operation re-establishes what it needs.
    async fn close(&self);
}

/// BEGIN / seed / COMMIT on the shared tenant session.
async fn run_seed(conn: &mut TenantConn, seed: &SeedFn) -> Result<()> {
    conn.batch_execute("BEGIN").await?;
    seed(conn).await?;
    conn.batch_execute("COMMIT").await?;
    Ok(())
}

/// Enum-based static dispatch over the engine managers.
#[derive(Debug)]
pub enum DatabaseManagerImpl {
    Postgres(PostgresManager),
    MySql(MysqlManager),
    Sqlite(SqliteManager),
}

impl DatabaseManagerImpl {
    /// Build a manager for the dialect named in `config`.
    ///
    /// Validates the configuration and normalizes the dialect alias; no
    /// connection is opened here.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` for invalid configuration or an unknown
    /// dialect alias.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(match Dialect::from_alias(&config.dialect)? {
            Dialect::Postgres => DatabaseManagerImpl::Postgres(PostgresManager::new(config)),
            Dialect::MySql => DatabaseManagerImpl::MySql(MysqlManager::new(config)),
            Dialect::Sqlite => DatabaseManagerImpl::Sqlite(SqliteManager::new(config)),
        })
    }
}

#[async_trait]
impl DatabaseManager for DatabaseManagerImpl {
    fn dialect(&self) -> Dialect {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.dialect(),
            DatabaseManagerImpl::MySql(m) => m.dialect(),
            DatabaseManagerImpl::Sqlite(m) => m.dialect(),
        }
    }

    fn config(&self) -> &Config {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.config(),
            DatabaseManagerImpl::MySql(m) => m.config(),
            DatabaseManagerImpl::Sqlite(m) => m.config(),
        }
    }

    async fn tenant(&self) -> Result<TenantConn> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.tenant().await,
            DatabaseManagerImpl::MySql(m) => m.tenant().await,
            DatabaseManagerImpl::Sqlite(m) => m.tenant().await,
        }
    }

    async fn create_db_owner_if_not_exists(&self) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.create_db_owner_if_not_exists().await,
            DatabaseManagerImpl::MySql(m) => m.create_db_owner_if_not_exists().await,
            DatabaseManagerImpl::Sqlite(m) => m.create_db_owner_if_not_exists().await,
        }
    }

    async fn create_db(&self, name: Option<&str>) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.create_db(name).await,
            DatabaseManagerImpl::MySql(m) => m.create_db(name).await,
            DatabaseManagerImpl::Sqlite(m) => m.create_db(name).await,
        }
    }

    async fn drop_db(&self, name: Option<&str>) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.drop_db(name).await,
            DatabaseManagerImpl::MySql(m) => m.drop_db(name).await,
            DatabaseManagerImpl::Sqlite(m) => m.drop_db(name).await,
        }
    }

    async fn copy_db(&self, from: &str, to: &str) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.copy_db(from, to).await,
            DatabaseManagerImpl::MySql(m) => m.copy_db(from, to).await,
            DatabaseManagerImpl::Sqlite(m) => m.copy_db(from, to).await,
        }
    }

    async fn truncate_db(&self, ignore_tables: &[&str]) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.truncate_db(ignore_tables).await,
            DatabaseManagerImpl::MySql(m) => m.truncate_db(ignore_tables).await,
            DatabaseManagerImpl::Sqlite(m) => m.truncate_db(ignore_tables).await,
        }
    }

    async fn update_id_sequences(&self) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.update_id_sequences().await,
            DatabaseManagerImpl::MySql(m) => m.update_id_sequences().await,
            DatabaseManagerImpl::Sqlite(m) => m.update_id_sequences().await,
        }
    }

    async fn invalidate_metadata_cache(&self) {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.invalidate_metadata_cache().await,
            DatabaseManagerImpl::MySql(m) => m.invalidate_metadata_cache().await,
            DatabaseManagerImpl::Sqlite(m) => m.invalidate_metadata_cache().await,
        }
    }

    async fn migrate_db(&self) -> Result<usize> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.migrate_db().await,
            DatabaseManagerImpl::MySql(m) => m.migrate_db().await,
            DatabaseManagerImpl::Sqlite(m) => m.migrate_db().await,
        }
    }

    async fn db_version(&self) -> Result<String> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.db_version().await,
            DatabaseManagerImpl::MySql(m) => m.db_version().await,
            DatabaseManagerImpl::Sqlite(m) => m.db_version().await,
        }
    }

    async fn populate_db(&self, seeds: &[SeedFn]) -> Result<()> {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.populate_db(seeds).await,
            DatabaseManagerImpl::MySql(m) => m.populate_db(seeds).await,
            DatabaseManagerImpl::Sqlite(m) => m.populate_db(seeds).await,
        }
    }

    async fn close(&self) {
        match self {
            DatabaseManagerImpl::Postgres(m) => m.close().await,
            DatabaseManagerImpl::MySql(m) => m.close().await,
            DatabaseManagerImpl::Sqlite(m) => m.close().await,
        }
    }
}
