//! PostgreSQL manager implementation.
//!
//! Administrative statements run through a single privileged session against
//! the `template1` bootstrap database; everything else goes through a
//! deadpool-postgres pool against the managed database. This is the only
//! engine that supports `copy_db` and `update_id_sequences`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio::sync::Mutex;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conn::TenantConn;
use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::ident::{escape_literal, quote_pg};
use crate::manager::DatabaseManager;

/// Database the master session connects to. Always present on a PostgreSQL
/// cluster, so administrative statements have somewhere to run before the
/// managed database exists.
const BOOTSTRAP_DATABASE: &str = "template1";

/// A serial `id` column's backing sequence and its configured minimum.
#[derive(Debug, Clone)]
struct IdSequence {
    table: String,
    sequence: String,
    min_value: i64,
}

/// PostgreSQL manager implementation.
#[derive(Debug)]
pub struct PostgresManager {
    config: Config,
    master: Mutex<Option<tokio_postgres::Client>>,
    tenant_pool: Mutex<Option<Pool>>,
    table_names: Mutex<Option<Vec<String>>>,
    id_sequences: Mutex<Option<Vec<IdSequence>>>,
}

impl PostgresManager {
    /// Create a manager from configuration. No connection is opened here.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            master: Mutex::new(None),
            tenant_pool: Mutex::new(None),
            table_names: Mutex::new(None),
            id_sequences: Mutex::new(None),
        }
    }

    fn port(&self) -> u16 {
        self.config
            .connection
            .port
            .unwrap_or_else(|| Dialect::Postgres.default_port())
    }

    /// Connection parameters for the privileged master session.
    fn master_pg_config(&self) -> Result<PgConfig> {
        let admin = &self.config.admin;
        if admin.super_user.is_empty() {
            return Err(DbError::Config(
                "admin.super_user is required for administrative operations".to_string(),
            ));
        }

        let mut pg_config = PgConfig::new();
        pg_config.host(&self.config.connection.host);
        pg_config.port(self.port());
        pg_config.dbname(BOOTSTRAP_DATABASE);
        pg_config.user(&admin.super_user);
        pg_config.password(&admin.super_password);
        Ok(pg_config)
    }

    async fn connect_master(&self) -> Result<tokio_postgres::Client> {
        let pg_config = self.master_pg_config()?;
        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            DbError::connection(e.to_string(), "connecting PostgreSQL master session")
        })?;

        // The connection future drives the socket; it resolves when the
        // client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL master connection ended with error: {}", e);
            }
        });

        info!(
            "Connected to PostgreSQL master: {}:{}/{}",
            self.config.connection.host,
            self.port(),
            BOOTSTRAP_DATABASE
        );
        Ok(client)
    }

    /// Run one administrative statement on the master session, connecting on
    /// first use. The slot lock serializes administrative statements.
    async fn master_execute(&self, sql: &str) -> Result<()> {
        let mut slot = self.master.lock().await;
        let client = match slot.take() {
            Some(client) => client,
            None => self.connect_master().await?,
        };

        debug!("master: {}", sql);
        let result = client.batch_execute(sql).await;
        *slot = Some(client);
        result?;
        Ok(())
    }

    /// The memoized tenant pool, built on first use.
    async fn pool(&self) -> Result<Pool> {
        let mut slot = self.tenant_pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let connection = &self.config.connection;
        let mut pg_config = PgConfig::new();
        pg_config.host(&connection.host);
        pg_config.port(self.port());
        pg_config.dbname(&connection.database);
        pg_config.user(&connection.user);
        pg_config.password(&connection.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(connection.pool_max)
            .build()
            .map_err(|e| DbError::connection(e.to_string(), "creating PostgreSQL tenant pool"))?;

        info!(
            "Created PostgreSQL tenant pool: {}:{}/{} (max {})",
            connection.host,
            self.port(),
            connection.database,
            connection.pool_max
        );
        *slot = Some(pool.clone());
        Ok(pool)
    }

    async fn tenant_client(&self) -> Result<deadpool_postgres::Client> {
        let pool = self.pool().await?;
        pool.get()
            .await
            .map_err(|e| DbError::connection(e.to_string(), "getting PostgreSQL tenant connection"))
    }

    /// User tables in the public schema, minus the migration bookkeeping
    /// table. Cached until [`invalidate_metadata_cache`].
    ///
    /// [`invalidate_metadata_cache`]: DatabaseManager::invalidate_metadata_cache
    async fn table_names(&self) -> Result<Vec<String>> {
        let mut slot = self.table_names.lock().await;
        if let Some(names) = slot.as_ref() {
            return Ok(names.clone());
        }

        let client = self.tenant_client().await?;
        let rows = client
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = 'public'",
                &[],
            )
            .await?;

        let bookkeeping = &self.config.connection.migrations_table_name;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            if name != *bookkeeping {
                names.push(name);
            }
        }

        debug!(count = names.len(), "cached table names");
        *slot = Some(names.clone());
        Ok(names)
    }

    /// Sequence descriptors for serial `id` columns, cached until
    /// invalidation. Built atop the table name cache.
    async fn id_sequences(&self) -> Result<Vec<IdSequence>> {
        let mut slot = self.id_sequences.lock().await;
        if let Some(sequences) = slot.as_ref() {
            return Ok(sequences.clone());
        }

        let tables = self.table_names().await?;
        let client = self.tenant_client().await?;
        let sequences = load_id_sequences(&client, &tables).await?;

        debug!(count = sequences.len(), "cached id sequences");
        *slot = Some(sequences.clone());
        Ok(sequences)
    }
}

/// Resolve, for every cached table with an `id` column, the backing serial
/// sequence and its configured minimum value.
async fn load_id_sequences(
    client: &deadpool_postgres::Client,
    tables: &[String],
) -> Result<Vec<IdSequence>> {
    let rows = client
        .query(
            "SELECT table_name FROM information_schema.columns \
             WHERE column_name = 'id' AND table_schema = 'public'",
            &[],
        )
        .await?;
    let mut with_id = HashSet::new();
    for row in rows {
        with_id.insert(row.try_get::<_, String>(0)?);
    }

    let candidates: Vec<&String> = tables.iter().filter(|t| with_id.contains(*t)).collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // pg_get_serial_sequence parses its first argument as an identifier, so
    // the table name goes in quoted inside the literal.
    let sql = candidates
        .iter()
        .map(|table| {
            Ok(format!(
                "SELECT '{}' AS table_name, pg_get_serial_sequence('{}', 'id') AS seq",
                escape_literal(table),
                escape_literal(&quote_pg(table)?)
            ))
        })
        .collect::<Result<Vec<_>>>()?
        .join(" UNION ALL ");

    let mut resolved: Vec<(String, String)> = Vec::new();
    for row in client.query(&sql, &[]).await? {
        let table: String = row.try_get(0)?;
        let seq: Option<String> = row.try_get(1)?;
        // NULL means the id column is not backed by a sequence.
        if let Some(seq) = seq {
            resolved.push((table, seq));
        }
    }
    if resolved.is_empty() {
        return Ok(Vec::new());
    }

    let sql = resolved
        .iter()
        .map(|(_, seq)| {
            format!(
                "SELECT '{}' AS seq, seqmin FROM pg_sequence WHERE seqrelid = '{}'::regclass",
                escape_literal(seq),
                escape_literal(seq)
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ");

    let mut minimums: HashMap<String, i64> = HashMap::new();
    for row in client.query(&sql, &[]).await? {
        let seq: String = row.try_get(0)?;
        let min: i64 = row.try_get(1)?;
        minimums.insert(seq, min);
    }

    let sequences = resolved
        .into_iter()
        .map(|(table, sequence)| {
            let min_value = minimums.get(&sequence).copied().unwrap_or(1);
            IdSequence {
                table,
                sequence,
                min_value,
            }
        })
        .collect();
    Ok(sequences)
}

/// One creation statement per collation candidate; a single engine-default
/// statement when no candidates are configured.
fn build_create_db_sql(name: &str, candidates: &[String]) -> Result<Vec<String>> {
    let quoted = quote_pg(name)?;
    if candidates.is_empty() {
        return Ok(vec![format!("CREATE DATABASE {}", quoted)]);
    }
    Ok(candidates
        .iter()
        .map(|collation| {
            // template0 because template1's collation is frozen at cluster
            // init time.
            format!(
                "CREATE DATABASE {} ENCODING = 'UTF-8' LC_COLLATE = '{}' TEMPLATE template0",
                quoted,
                escape_literal(collation)
            )
        })
        .collect())
}

/// Single-statement truncation so foreign-key cross-references truncate
/// together; RESTART IDENTITY resets the backing sequences.
fn build_truncate_sql(targets: &[String]) -> Result<String> {
    let quoted = targets
        .iter()
        .map(|t| quote_pg(t))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "TRUNCATE TABLE {} RESTART IDENTITY",
        quoted.join(",")
    ))
}

/// One setval arm per sequence: next `nextval` returns exactly
/// `max(id) + 1`, clamped below by the sequence minimum. The third argument
/// `false` marks the value as not yet consumed.
fn build_setval_sql(sequences: &[IdSequence]) -> Result<String> {
    let arms = sequences
        .iter()
        .map(|seq| {
            Ok(format!(
                "SELECT setval('{}', GREATEST(COALESCE(MAX(id), 0) + 1, {}), false) FROM {}",
                escape_literal(&seq.sequence),
                seq.min_value,
                quote_pg(&seq.table)?
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(arms.join(" UNION ALL "))
}

#[async_trait]
impl DatabaseManager for PostgresManager {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn tenant(&self) -> Result<TenantConn> {
        Ok(TenantConn::Postgres(self.tenant_client().await?))
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
        outcome
    }

    async fn drop_db(&self, name: Option<&str>) -> Result<()> {
        let name = name.unwrap_or(self.config.connection.database.as_str());
        let sql = format!("DROP DATABASE IF EXISTS {}", quote_pg(name)?);
        self.master_execute(&sql).await?;
        info!("Dropped database '{}'", name);
        Ok(())
    }

    async fn copy_db(&self, from: &str, to: &str) -> Result<()> {
        let sql = format!(
            "CREATE DATABASE {} TEMPLATE {}",
            quote_pg(to)?,
            quote_pg(from)?
        );
        self.master_execute(&sql).await?;
        info!("Copied database '{}' to '{}'", from, to);
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

        let sql = build_truncate_sql(&targets)?;
        let client = self.tenant_client().await?;
        client.batch_execute(&sql).await?;
        info!(count = targets.len(), "truncated tables");
        Ok(())
    }

    async fn update_id_sequences(&self) -> Result<()> {
        let sequences = self.id_sequences().await?;
        if sequences.is_empty() {
            debug!("no id sequences to update");
            return Ok(());
        }

        let sql = build_setval_sql(&sequences)?;
        let client = self.tenant_client().await?;
        client.simple_query(&sql).await?;
        info!(count = sequences.len(), "resynchronized id sequences");
        Ok(())
    }

    async fn invalidate_metadata_cache(&self) {
        *self.table_names.lock().await = None;
        *self.id_sequences.lock().await = None;
        debug!("metadata caches invalidated");
    }

    async fn close(&self) {
        if let Some(client) = self.master.lock().await.take() {
            // Dropping the client resolves the spawned connection task.
            drop(client);
            debug!("closed PostgreSQL master session");
        }
        if let Some(pool) = self.tenant_pool.lock().await.take() {
            pool.close();
            debug!("closed PostgreSQL tenant pool");
        }
    }
}
