//! Configuration structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pool_min() -> usize {
    0
}

fn default_pool_max() -> usize {
    10
}

fn default_migrations_table() -> String {
    "schema_migrations".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dialect alias (`pg`, `postgres`, `mysql2`, `sqlite3`, ...).
    pub dialect: String,
    /// Tenant connection settings.
    pub connection: ConnectionConfig,
    /// Privileged (superuser) settings for administrative statements.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Tenant connection settings: how the managed database itself is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host. Ignored for SQLite.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port; engine default (5432 / 3306) when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Application user the managed database belongs to.
    #[serde(default)]
    pub user: String,
    /// Application user password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Managed database name; file path for SQLite.
    pub database: String,
    /// Minimum connections kept in the tenant pool.
    #[serde(default = "default_pool_min")]
    pub pool_min: usize,
    /// Maximum connections in the tenant pool.
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    /// Directory holding `.sql` migration files, if migrations are used.
    #[serde(default)]
    pub migrations_directory: Option<PathBuf>,
    /// Migration bookkeeping table name.
    #[serde(default = "default_migrations_table")]
    pub migrations_table_name: String,
}

/// Privileged settings used only by administrative operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Superuser name. Required before the first administrative statement,
    /// never defaulted.
    #[serde(default)]
    pub super_user: String,
    /// Superuser password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub super_password: String,
    /// Ordered collation candidates for database creation; empty means one
    /// attempt with the engine default.
    #[serde(default)]
    pub collation_candidates: Vec<String>,
}
