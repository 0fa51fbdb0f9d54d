//! Configuration validation.

use crate::dialect::Dialect;
use crate::error::{DbError, Result};

use super::Config;

/// Validate a configuration before a manager is built from it.
///
/// Superuser settings are deliberately not checked here: they are only
/// required once the first administrative statement runs, and shared
/// operations (migrate, seed, version) must work without them.
pub fn validate_config(config: &Config) -> Result<()> {
    let dialect = Dialect::from_alias(&config.dialect)?;
    let conn = &config.connection;

    if conn.database.is_empty() {
        return Err(DbError::Config(
            "connection.database must not be empty".to_string(),
        ));
    }

    if dialect != Dialect::Sqlite {
        if conn.host.is_empty() {
            return Err(DbError::Config(
                "connection.host must not be empty".to_string(),
            ));
        }
        if conn.user.is_empty() {
            return Err(DbError::Config(
                "connection.user must not be empty".to_string(),
            ));
        }
    }

    if conn.pool_max == 0 {
        return Err(DbError::Config(
            "connection.pool_max must be at least 1".to_string(),
        ));
    }

    if conn.pool_min > conn.pool_max {
        return Err(DbError::Config(format!(
            "connection.pool_min ({}) must not exceed connection.pool_max ({})",
            conn.pool_min, conn.pool_max
        )));
    }

    if conn.migrations_table_name.is_empty() {
        return Err(DbError::Config(
            "connection.migrations_table_name must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_yaml() -> &'static str {
        r#"
dialect: postgres
connection:
  host: localhost
  user: app
  password: secret
  database: app_test
"#
    }

    #[test]
    fn test_valid_config_passes() {
        let config = Config::from_yaml(valid_yaml()).unwrap();
        assert_eq!(config.dialect, "postgres");
        assert_eq!(config.connection.database, "app_test");
    }

    #[test]
    fn test_unknown_dialect_fails() {
        let yaml = valid_yaml().replace("postgres", "oracle");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("Unknown dialect"));
    }

    #[test]
    fn test_empty_database_fails() {
        let yaml = valid_yaml().replace("app_test", "\"\"");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("connection.database"));
    }

    #[test]
    fn test_missing_user_fails_for_server_dialects() {
        let yaml = r#"
dialect: mysql
connection:
  host: localhost
  database: app_test
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("connection.user"));
    }

    #[test]
    fn test_sqlite_needs_only_database() {
        let yaml = r#"
dialect: sqlite3
connection:
  database: /tmp/app_test.sqlite
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.connection.database, "/tmp/app_test.sqlite");
    }

    #[test]
    fn test_pool_bounds_validated() {
        let yaml = r#"
dialect: pg
connection:
  host: localhost
  user: app
  database: app_test
  pool_max: 0
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("pool_max"));

        let yaml = r#"
dialect: pg
connection:
  host: localhost
  user: app
  database: app_test
  pool_min: 5
  pool_max: 2
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("pool_min"));
    }

    #[test]
    fn test_collation_candidates_parsed_in_order() {
        let yaml = r#"
dialect: postgres
connection:
  host: localhost
  user: app
  database: app_test
admin:
  super_user: postgres
  collation_candidates: ["fi_FI.UTF-8", "en_US.utf8", "C.UTF-8"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.admin.collation_candidates,
            vec!["fi_FI.UTF-8", "en_US.utf8", "C.UTF-8"]
        );
    }
}
