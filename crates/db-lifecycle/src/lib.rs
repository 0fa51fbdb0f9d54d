//! # db-lifecycle
//!
//! Database lifecycle management for integration testing and operations:
//! create, drop, copy and truncate databases, run SQL migrations, seed data
//! and resynchronize identity sequences behind one dialect-abstracted
//! interface.
//!
//! Supported engines:
//!
//! - **PostgreSQL**: full surface, including `copy_db` and identity sequence
//!   resynchronization
//! - **MySQL / MariaDB**: create/drop/truncate plus database owner creation
//!   and privilege grants
//! - **SQLite**: migrations, schema version and seeding against a local file
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_lifecycle::{Config, DatabaseManager, DatabaseManagerImpl};
//!
//! #[tokio::main]
//! async fn main() -> db_lifecycle::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let manager = DatabaseManagerImpl::from_config(config)?;
//!     manager.create_db(None).await?;
//!     let applied = manager.migrate_db().await?;
//!     println!("Applied {} migrations", applied);
//!     manager.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conn;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod manager;
pub mod migrate;

// Re-exports for convenient access
pub use config::{AdminConfig, Config, ConnectionConfig};
pub use conn::TenantConn;
pub use dialect::Dialect;
pub use error::{DbError, Result};
pub use manager::{
    DatabaseManager, DatabaseManagerImpl, MysqlManager, PostgresManager, SeedFn, SqliteManager,
};
pub use migrate::{MigrationFile, NO_VERSION};
