//! MySQL/MariaDB manager implementation.
//!
//! Administrative statements run through a single privileged session with no
//! database selected; everything else goes through a mysql_async pool against
//! the managed database. Supports database owner creation and privilege
//! grants in addition to the shared operations; `copy_db` and
//! `update_id_sequences` keep the unsupported defaults.

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, TxOpts};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conn::TenantConn;
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::ident::{escape_mysql_literal, quote_mysql};
use crate::manager::DatabaseManager;

/// MySQL/MariaDB manager implementation.
#[derive(Debug)]
pub struct MysqlManager {
    config: Config,
    master: Mutex<Option<Conn>>,
    tenant_pool: Mutex<Option<Pool>>,
    table_names: Mutex<Option<Vec<String>>>,
}

impl MysqlManager {
    /// Create a manager from configuration. No connection is opened here.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            master: Mutex::new(None),
            tenant_pool: Mutex::new(None),
            table_names: Mutex::new(None),
        }
    }

    fn port(&self) -> u16 {
        self.config
            .connection
            .port
            .unwrap_or_else(|| Dialect::MySql.default_port())
    }

    /// Connection options for the privileged master session. No database is
    /// selected so the session works before the managed database exists.
    fn master_opts(&self) -> Result<Opts> {
        let admin = &self.config.admin;
        if admin.super_user.is_empty() {
            return Err(DbError::Config(
                "admin.super_user is required for administrative operations".to_string(),
            ));
        }

        let builder = OptsBuilder::default()
            .ip_or_hostname(&self.config.connection.host)
            .tcp_port(self.port())
            .user(Some(&admin.super_user))
            .pass(Some(&admin.super_password));
        Ok(builder.into())
    }

    /// Connection options for the tenant pool against the managed database.
    fn tenant_opts(&self) -> Result<Opts> {
        let connection = &self.config.connection;
        let constraints = PoolConstraints::new(connection.pool_min, connection.pool_max)
            .ok_or_else(|| {
                DbError::Config(format!(
                    "invalid pool bounds: min {} must not exceed max {}",
                    connection.pool_min, connection.pool_max
                ))
            })?;
        let pool_opts = PoolOpts::new().with_constraints(constraints);

        let builder = OptsBuilder::default()
            .ip_or_hostname(&connection.host)
            .tcp_port(self.port())
            .db_name(Some(&connection.database))
            .user(Some(&connection.user))
            .pass(Some(&connection.password))
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(pool_opts);
        Ok(builder.into())
    }

    async fn connect_master(&self) -> Result<Conn> {
        let opts = self.master_opts()?;
        let conn = Conn::new(opts)
            .await
            .map_err(|e| DbError::connection(e.to_string(), "connecting MySQL master session"))?;
        info!(
            "Connected to MySQL master: {}:{}",
            self.config.connection.host,
            self.port()
        );
        Ok(conn)
    }

    /// Run one administrative statement on the master session, connecting on
    /// first use. `display_sql` is what gets logged; CREATE USER carries the
    /// password inline.
    async fn master_execute_display(&self, sql: &str, display_sql: &str) -> Result<()> {
        let mut slot = self.master.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect_master().await?,
        };

        // A local named `display` collides with `use tracing::field::display`
        // inside the macro expansion, so the parameter avoids that name.
        debug!("master: {}", display_sql);
        let result = conn.query_drop(sql).await;
        *slot = Some(conn);
        result?;
        Ok(())
    }

    async fn master_execute(&self, sql: &str) -> Result<()> {
        self.master_execute_display(sql, sql).await
    }

    /// The memoized tenant pool, built on first use.
    async fn pool(&self) -> Result<Pool> {
        let mut slot = self.tenant_pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let connection = &self.config.connection;
        let pool = Pool::new(self.tenant_opts()?);
        info!(
            "Created MySQL tenant pool: {}:{}/{} (max {})",
            connection.host,
            self.port(),
            connection.database,
            connection.pool_max
        );
        *slot = Some(pool.clone());
        Ok(pool)
    }

    async fn tenant_conn(&self) -> Result<Conn> {
        let pool = self.pool().await?;
        pool.get_conn()
            .await
            .map_err(|e| DbError::connection(e.to_string(), "getting MySQL tenant connection"))
    }

    /// User tables in the managed database, minus the migration bookkeeping
    /// table. Cached until invalidation.
    async fn table_names(&self) -> Result<Vec<String>> {
        let mut slot = self.table_names.lock().await;
        if let Some(names) = slot.as_ref() {
            return Ok(names.clone());
        }

        let mut conn = self.tenant_conn().await?;
        let all: Vec<String> = conn
            .exec(
                "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = ?",
                (self.config.connection.database.as_str(),),
            )
            .await?;

        let bookkeeping = &self.config.connection.migrations_table_name;
        let names: Vec<String> = all.into_iter().filter(|n| n != bookkeeping).collect();

        debug!(count = names.len(), "cached table names");
        *slot = Some(names.clone());
        Ok(names)
    }

    async fn grant_privileges(&self, name: &str) -> Result<()> {
        let sql = build_grant_sql(name, &self.config.connection.user)?;
        self.master_execute(&sql).await?;
        info!(
            "Granted privileges on '{}' to '{}'",
            name, self.config.connection.user
        );
        Ok(())
    }
}

/// One creation statement per collation candidate; a utf8mb4 default when no
/// candidates are configured. The character set is implied by the collation.
fn build_create_db_sql(name: &str, candidates: &[String]) -> Result<Vec<String>> {
    let quoted = quote_mysql(name)?;
    if candidates.is_empty() {
        return Ok(vec![format!(
            "CREATE DATABASE {} DEFAULT CHARACTER SET utf8mb4 DEFAULT COLLATE utf8mb4_general_ci",
            quoted
        )]);
    }
    Ok(candidates
        .iter()
        .map(|collation| {
            format!(
                "CREATE DATABASE {} DEFAULT COLLATE '{}'",
                quoted,
                escape_mysql_literal(collation)
            )
        })
        .collect())
}

/// TRUNCATE resets AUTO_INCREMENT, so each statement also resets the
/// table's identity counter.
fn build_truncate_sql(targets: &[String]) -> Result<Vec<String>> {
    targets
        .iter()
        .map(|t| Ok(format!("TRUNCATE TABLE {}", quote_mysql(t)?)))
        .collect()
}

fn build_create_user_sql(user: &str, password: &str) -> String {
    format!(
        "CREATE USER IF NOT EXISTS '{}'@'%' IDENTIFIED BY '{}'",
        escape_mysql_literal(user),
        escape_mysql_literal(password)
    )
}

fn build_grant_sql(database: &str, user: &str) -> Result<String> {
    Ok(format!(
        "GRANT ALL PRIVILEGES ON {}.* TO '{}'@'%'",
        quote_mysql(database)?,
        escape_mysql_literal(user)
    ))
}

async fn truncate_all(conn: &mut Conn, statements: &[String]) -> Result<()> {
    let mut tx = conn.start_transaction(TxOpts::default()).await?;
    for sql in statements {
        tx.query_drop(sql).await?;
    }
    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl DatabaseManager for MysqlManager {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn tenant(&self) -> Result<TenantConn> {
        Ok(TenantConn::MySql(self.tenant_conn().await?))
    }

    async fn create_db_owner_if_not_exists(&self) -> Result<()> {
        let connection = &self.config.connection;
        let sql = build_create_user_sql(&connection.user, &connection.password);
        let display = format!("CREATE USER IF NOT EXISTS '{}'@'%'", connection.user);
        self.master_execute_display(&sql, &display).await?;
        info!("Ensured database owner '{}' exists", connection.user);
        Ok(())
    }

    async fn create_db(&self, name: Option<&str>) -> Result<()> {
        let name = name.unwrap_or(self.config.connection.database.as_str());
        let statements = build_create_db_sql(name, &self.config.admin.collation_candidates)?;

        let mut outcome = Ok(());
        for sql in &statements {
            outcome = self.master_execute(sql).await;
            match &outcome {
                Ok(()) => {
                    info!("Created database '{}'", name);
                    break;
                }
                Err(e) => debug!("create attempt failed: {}", e),
            }
        }
        outcome?;

        self.grant_privileges(name).await
    }

    async fn drop_db(&self, name: Option<&str>) -> Result<()> {
        let name = name.unwrap_or(self.config.connection.database.as_str());
        let sql = format!("DROP DATABASE IF EXISTS {}", quote_mysql(name)?);
        self.master_execute(&sql).await?;
        info!("Dropped database '{}'", name);
        Ok(())
    }

    async fn truncate_db(&self, ignore_tables: &[&str]) -> Result<()> {
        let tables = self.table_names().await?;
        let targets: Vec<String> = tables
            .into_iter()
            .filter(|t| !ignore_tables.contains(&t.as_str()))
            .collect();
        if targets.is_empty() {
            debug!("no tables to truncate");
            return Ok(());
        }
        let statements = build_truncate_sql(&targets)?;

        let mut conn = self.tenant_conn().await?;
        conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;
        let result = truncate_all(&mut conn, &statements).await;
        // FOREIGN_KEY_CHECKS is session state and the session returns to the
        // pool, so restore it even when a truncation failed.
        let restore = conn.query_drop("SET FOREIGN_KEY_CHECKS = 1").await;
        result?;
        restore?;

        info!(count = targets.len(), "truncated tables");
        Ok(())
    }

    async fn invalidate_metadata_cache(&self) {
        *self.table_names.lock().await = None;
        debug!("metadata cache invalidated");
    }

    async fn close(&self) {
        if let Some(conn) = self.master.lock().await.take() {
            match conn.disconnect().await {
                Ok(()) => debug!("closed MySQL master session"),
                Err(e) => warn!("MySQL master disconnect failed: {}", e),
            }
        }
        if let Some(pool) = self.tenant_pool.lock().await.take() {
            match pool.disconnect().await {
                Ok(()) => debug!("closed MySQL tenant pool"),
                Err(e) => warn!("MySQL tenant pool disconnect failed: {}", e),
            }
        }
    }
}
