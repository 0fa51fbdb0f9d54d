//! SQL-file migration runner.
//!
//! Migrations are plain `.sql` files in the configured directory, named with
//! a numeric prefix (`20150623130922_add_users.sql`) and applied in ascending
//! filename order. Applied names are recorded in a bookkeeping table so the
//! runner is idempotent; the reported schema version is the numeric prefix of
//! the newest applied file, or `"none"` before the first run.
//!
//! PostgreSQL and SQLite apply each file inside a transaction together with
//! its bookkeeping row. MySQL commits DDL implicitly, so its files run bare
//! and the bookkeeping row follows.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::conn::TenantConn;
use crate::dialect::Dialect;
use crate::error::{DbError, Result};

/// Version reported before any migration has been applied.
pub const NO_VERSION: &str = "none";

/// One migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File stem, the recorded name (`20150623130922_add_users`).
    pub name: String,
    /// Numeric prefix of the stem; the whole stem when there is none.
    pub version: String,
    pub path: PathBuf,
}

/// Numeric prefix of a migration name, or the whole name when it has none.
pub fn migration_version(name: &str) -> String {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        name.to_string()
    } else {
        digits
    }
}

/// List `.sql` files in a migrations directory, ascending by filename.
pub fn list_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        DbError::Config(format!(
            "cannot read migrations directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        files.push(MigrationFile {
            name: stem.to_string(),
            version: migration_version(stem),
            path,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Bookkeeping table DDL per engine.
fn bookkeeping_ddl(dialect: Dialect, table: &str) -> Result<String> {
    let quoted = dialect.quote_ident(table)?;
    Ok(match dialect {
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             name TEXT PRIMARY KEY, \
             batch INTEGER NOT NULL, \
             migration_time TIMESTAMPTZ NOT NULL DEFAULT now())",
            quoted
        ),
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             name VARCHAR(255) PRIMARY KEY, \
             batch INT NOT NULL, \
             migration_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            quoted
        ),
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             name TEXT PRIMARY KEY, \
             batch INTEGER NOT NULL, \
             migration_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            quoted
        ),
    })
}

/// SQL checking whether the bookkeeping table exists.
fn table_exists_sql(dialect: Dialect, table: &str) -> String {
    let literal = dialect.escape_literal(table);
    match dialect {
        Dialect::Postgres => format!(
            "SELECT COUNT(*) FROM pg_tables WHERE schemaname = 'public' AND tablename = '{}'",
            literal
        ),
        Dialect::MySql => format!(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}'",
            literal
        ),
        Dialect::Sqlite => format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{}'",
            literal
        ),
    }
}

async fn bookkeeping_table_exists(conn: &mut TenantConn, table: &str) -> Result<bool> {
    let sql = table_exists_sql(conn.dialect(), table);
    Ok(conn.query_opt_i64(&sql).await?.unwrap_or(0) > 0)
}

async fn next_batch(conn: &mut TenantConn, quoted_table: &str) -> Result<i64> {
    let sql = match conn.dialect() {
        // MAX over an int4 column would come back as int4; the runner reads i64.
        Dialect::Postgres => format!(
            "SELECT COALESCE(MAX(batch), 0)::bigint FROM {}",
            quoted_table
        ),
        _ => format!("SELECT COALESCE(MAX(batch), 0) FROM {}", quoted_table),
    };
    let max = conn.query_opt_i64(&sql).await?.unwrap_or(0);
    Ok(max + 1)
}

async fn run_file(conn: &mut TenantConn, sql: &str, record: &str) -> Result<()> {
    conn.batch_execute(sql).await?;
    conn.execute(record).await?;
    Ok(())
}

async fn apply_migration(
    conn: &mut TenantConn,
    quoted_table: &str,
    file: &MigrationFile,
    batch: i64,
) -> Result<()> {
    let sql = std::fs::read_to_string(&file.path).map_err(|e| {
        DbError::migration(&file.name, format!("cannot read {}: {}", file.path.display(), e))
    })?;
    let record = format!(
        "INSERT INTO {} (name, batch) VALUES ('{}', {})",
        quoted_table,
        conn.dialect().escape_literal(&file.name),
        batch
    );

    debug!(name = file.name.as_str(), batch, "applying migration");

    match conn.dialect() {
        // MySQL DDL commits implicitly; a wrapping transaction would be a lie.
        Dialect::MySql => run_file(conn, &sql, &record)
            .await
            .map_err(|e| DbError::migration(&file.name, e.to_string())),
        Dialect::Postgres | Dialect::Sqlite => {
            conn.batch_execute("BEGIN")
                .await
                .map_err(|e| DbError::migration(&file.name, e.to_string()))?;
            if let Err(e) = run_file(conn, &sql, &record).await {
                let _ = conn.batch_execute("ROLLBACK").await;
                return Err(DbError::migration(&file.name, e.to_string()));
            }
            conn.batch_execute("COMMIT")
                .await
                .map_err(|e| DbError::migration(&file.name, e.to_string()))
        }
    }
}

/// Apply every pending migration in `dir`, recording each in `table`.
///
/// Returns the number of migrations applied by this call.
pub async fn migrate_to_latest(conn: &mut TenantConn, table: &str, dir: &Path) -> Result<usize> {
    let files = list_migrations(dir)?;
    let quoted = conn.dialect().quote_ident(table)?;

    conn.batch_execute(&bookkeeping_ddl(conn.dialect(), table)?)
        .await?;

    let applied = conn
        .query_strings(&format!("SELECT name FROM {} ORDER BY name", quoted))
        .await?;
    let batch = next_batch(conn, &quoted).await?;

    let mut count = 0;
    for file in &files {
        if applied.contains(&file.name) {
            continue;
        }
        apply_migration(conn, &quoted, file, batch).await?;
        count += 1;
    }

    if count > 0 {
        info!(count, batch, "applied migrations");
    } else {
        debug!("migrations already up to date");
    }
    Ok(count)
}

/// Report the current schema version.
///
/// `"none"` when the bookkeeping table is missing or empty, otherwise the
/// numeric prefix of the newest applied migration name.
pub async fn current_version(conn: &mut TenantConn, table: &str) -> Result<String> {
    if !bookkeeping_table_exists(conn, table).await? {
        return Ok(NO_VERSION.to_string());
    }
    let quoted = conn.dialect().quote_ident(table)?;
    let latest = conn
        .query_opt_string(&format!(
            "SELECT name FROM {} ORDER BY name DESC LIMIT 1",
            quoted
        ))
        .await?;
    Ok(match latest {
        Some(name) => migration_version(&name),
        None => NO_VERSION.to_string(),
    })
}
