//! Live tenant connections.
//!
//! [`TenantConn`] is a session against the managed database itself, as
//! opposed to the privileged master session the engine managers hold for
//! administrative statements. The migration runner and seed routines are
//! written against this enum so they stay engine-agnostic; callers that need
//! driver-level access can match on the variants.

use std::sync::Arc;

use mysql_async::prelude::Queryable;
use rusqlite::OptionalExtension;
use tokio::sync::Mutex;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::ident::split_statements;

/// A live session against the managed database.
///
/// PostgreSQL sessions come from the manager's deadpool pool and return to it
/// on drop; MySQL sessions likewise return to the mysql_async pool. The
/// SQLite variant shares one handle to the database file.
pub enum TenantConn {
    Postgres(deadpool_postgres::Client),
    MySql(mysql_async::Conn),
    Sqlite(Arc<Mutex<rusqlite::Connection>>),
}

impl TenantConn {
    /// The engine behind this session.
    pub fn dialect(&self) -> Dialect {
        match self {
            TenantConn::Postgres(_) => Dialect::Postgres,
            TenantConn::MySql(_) => Dialect::MySql,
            TenantConn::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute a script that may contain several statements.
    ///
    /// PostgreSQL and SQLite run the whole script in one round trip; MySQL
    /// executes one statement at a time, so the script is split on top-level
    /// semicolons first.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        match self {
            TenantConn::Postgres(client) => {
                client.batch_execute(sql).await?;
                Ok(())
            }
            TenantConn::MySql(conn) => {
                for statement in split_statements(sql) {
                    conn.query_drop(statement).await?;
                }
                Ok(())
            }
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                conn.execute_batch(sql)?;
                Ok(())
            }
        }
    }

    /// Execute a single statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        match self {
            TenantConn::Postgres(client) => Ok(client.execute(sql, &[]).await?),
            TenantConn::MySql(conn) => {
                conn.query_drop(sql).await?;
                Ok(conn.affected_rows())
            }
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                Ok(conn.execute(sql, [])? as u64)
            }
        }
    }

    /// Run a query and collect the first column of every row as a string.
    pub async fn query_strings(&mut self, sql: &str) -> Result<Vec<String>> {
        match self {
            TenantConn::Postgres(client) => {
                let rows = client.query(sql, &[]).await?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    out.push(row.try_get::<_, String>(0)?);
                }
                Ok(out)
            }
            TenantConn::MySql(conn) => {
                let rows: Vec<String> = conn.query(sql).await?;
                Ok(rows)
            }
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            }
        }
    }

    /// Run a query expected to yield at most one row with a string column.
    pub async fn query_opt_string(&mut self, sql: &str) -> Result<Option<String>> {
        match self {
            TenantConn::Postgres(client) => {
                let row = client.query_opt(sql, &[]).await?;
                Ok(match row {
                    Some(row) => Some(row.try_get::<_, String>(0)?),
                    None => None,
                })
            }
            TenantConn::MySql(conn) => Ok(conn.query_first(sql).await?),
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                Ok(conn
                    .query_row(sql, [], |row| row.get::<_, String>(0))
                    .optional()?)
            }
        }
    }

    /// Run a query expected to yield at most one row with an integer column.
    pub async fn query_opt_i64(&mut self, sql: &str) -> Result<Option<i64>> {
        match self {
            TenantConn::Postgres(client) => {
                let row = client.query_opt(sql, &[]).await?;
                Ok(match row {
                    Some(row) => Some(row.try_get::<_, i64>(0)?),
                    None => None,
                })
            }
            TenantConn::MySql(conn) => Ok(conn.query_first(sql).await?),
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                Ok(conn
                    .query_row(sql, [], |row| row.get::<_, i64>(0))
                    .optional()?)
            }
        }
    }

    /// Cheap liveness probe.
    pub async fn ping(&mut self) -> Result<()> {
        match self {
            TenantConn::Postgres(client) => {
                client.simple_query("SELECT 1").await?;
                Ok(())
            }
            TenantConn::MySql(conn) => {
                conn.query_drop("SELECT 1").await?;
                Ok(())
            }
            TenantConn::Sqlite(handle) => {
                let conn = handle.lock().await;
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            }
        }
    }
}
