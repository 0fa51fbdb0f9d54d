//! Dialect identification and per-engine SQL syntax differences.
//!
//! The dialect tag in the configuration is a free-form string; this module
//! normalizes the aliases the original knex ecosystem established
//! (`pg`, `mysql2`, `mariadb`, `sqlite3`, ...) down to the three supported
//! engines.

use crate::error::{DbError, Result};
use crate::ident;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Normalize a dialect alias from configuration.
    ///
    /// Matching is case-insensitive on the trimmed input.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending value and the supported dialects
    /// if the alias is not recognized.
    pub fn from_alias(alias: &str) -> Result<Self> {
        match alias.trim().to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mysql2" | "maria" | "mariadb" | "mariasql" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(DbError::Config(format!(
                "Unknown dialect: '{}'. Supported dialects: postgres, mysql, sqlite",
                other
            ))),
        }
    }

    /// Get the canonical dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Default server port when the configuration does not set one.
    ///
    /// SQLite has no network port; it reports 0.
    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::Postgres => 5432,
            Dialect::MySql => 3306,
            Dialect::Sqlite => 0,
        }
    }

    /// Quote an identifier (database name, table name) for this engine.
    ///
    /// SQLite follows the SQL-standard double-quote convention, same as
    /// PostgreSQL.
    pub fn quote_ident(&self, name: &str) -> Result<String> {
        match self {
            Dialect::MySql => ident::quote_mysql(name),
            Dialect::Postgres | Dialect::Sqlite => ident::quote_pg(name),
        }
    }

    /// Escape a string literal for this engine. The caller wraps the result
    /// in single quotes.
    pub fn escape_literal(&self, value: &str) -> String {
        match self {
            Dialect::MySql => ident::escape_mysql_literal(value),
            Dialect::Postgres | Dialect::Sqlite => ident::escape_literal(value),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_alias_postgres() {
        for alias in ["pg", "postgres", "postgresql"] {
            assert_eq!(Dialect::from_alias(alias).unwrap(), Dialect::Postgres);
        }
    }

    #[test]
    fn test_from_alias_mysql() {
        for alias in ["mysql", "mysql2", "maria", "mariadb", "mariasql"] {
            assert_eq!(Dialect::from_alias(alias).unwrap(), Dialect::MySql);
        }
    }

    #[test]
    fn test_from_alias_sqlite() {
        for alias in ["sqlite", "sqlite3"] {
            assert_eq!(Dialect::from_alias(alias).unwrap(), Dialect::Sqlite);
        }
    }

    #[test]
    fn test_from_alias_case_insensitive() {
        assert_eq!(Dialect::from_alias("PostgreSQL").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_alias(" MySQL2 ").unwrap(), Dialect::MySql);
    }

    #[test]
    fn test_from_alias_unknown() {
        let err = Dialect::from_alias("oracle").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'oracle'"));
        assert!(msg.contains("postgres, mysql, sqlite"));
    }

    #[test]
    fn test_names_and_ports() {
        assert_eq!(Dialect::Postgres.name(), "postgres");
        assert_eq!(Dialect::MySql.name(), "mysql");
        assert_eq!(Dialect::Sqlite.name(), "sqlite");
        assert_eq!(Dialect::Postgres.default_port(), 5432);
        assert_eq!(Dialect::MySql.default_port(), 3306);
    }

    #[test]
    fn test_quote_ident_per_dialect() {
        assert_eq!(Dialect::Postgres.quote_ident("User").unwrap(), "\"User\"");
        assert_eq!(Dialect::MySql.quote_ident("User").unwrap(), "`User`");
        assert_eq!(Dialect::Sqlite.quote_ident("User").unwrap(), "\"User\"");
    }
}
