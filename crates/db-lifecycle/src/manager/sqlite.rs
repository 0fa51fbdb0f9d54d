//! SQLite manager implementation.
//!
//! SQLite has no server: the database is a file and there is nothing to
//! administer beyond opening it. The shared operations (migrations, schema
//! version, seeding) run through a single serialized connection; the
//! administrative operations keep the unsupported defaults.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::conn::TenantConn;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::manager::DatabaseManager;

/// SQLite manager implementation.
#[derive(Debug)]
pub struct SqliteManager {
    config: Config,
    conn: Mutex<Option<Arc<Mutex<rusqlite::Connection>>>>,
}

impl SqliteManager {
    /// Create a manager from configuration. The database file is opened on
    /// first use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// The memoized connection handle, opening the database file (and
    /// creating it if missing) on first use.
    async fn handle(&self) -> Result<Arc<Mutex<rusqlite::Connection>>> {
        let mut slot = self.conn.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let path = &self.config.connection.database;
        let conn = rusqlite::Connection::open(path)?;
        info!("Opened SQLite database: {}", path);

        let handle = Arc::new(Mutex::new(conn));
        *slot = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl DatabaseManager for SqliteManager {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn tenant(&self) -> Result<TenantConn> {
        Ok(TenantConn::Sqlite(self.handle().await?))
    }

    async fn close(&self) {
        // Outstanding tenant handles keep the file open until they drop.
        if let Some(handle) = self.conn.lock().await.take() {
            drop(handle);
            debug!("closed SQLite handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_for(path: &std::path::Path) -> SqliteManager {
        SqliteManager::new(
            Config::from_yaml(&format!(
                r#"
dialect: sqlite
connection:
  database: {}
"#,
                path.display()
            ))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_handle_is_memoized_and_reopens_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let manager = manager_for(&path);

        let first = manager.handle().await.unwrap();
        let second = manager.handle().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        manager.close().await;
        let third = manager.handle().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_tenant_ping() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(&dir.path().join("app.db"));

        let mut conn = manager.tenant().await.unwrap();
        conn.ping().await.unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);
    }
}
