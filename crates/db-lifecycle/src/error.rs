//! Error types for database lifecycle operations.

use thiserror::Error;

/// Main error type for database administration operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration error (invalid YAML, unknown dialect, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation that is not implemented for the configured dialect
    #[error("{operation} is not supported for the {dialect} dialect")]
    Unsupported {
        operation: &'static str,
        dialect: &'static str,
    },

    /// PostgreSQL connection or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL connection or query error
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection establishment error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Migration file failed to apply
    #[error("Migration {file} failed: {message}")]
    Migration { file: String, message: String },

    /// Seed routine failed; the batch is aborted at this index
    #[error("Seed #{index} failed: {source}")]
    Seed { index: usize, source: Box<DbError> },

    /// IO error (migration files, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DbError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        DbError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create an Unsupported error naming the operation and the dialect
    pub fn unsupported(operation: &'static str, dialect: &'static str) -> Self {
        DbError::Unsupported { operation, dialect }
    }

    /// Create a Migration error for a specific migration file
    pub fn migration(file: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Migration {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for database lifecycle operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        let err = DbError::unsupported("copy_db", "mysql");
        assert_eq!(
            err.to_string(),
            "copy_db is not supported for the mysql dialect"
        );
    }

    #[test]
    fn test_format_detailed_walks_seed_chain() {
        let err = DbError::Seed {
            index: 2,
            source: Box::new(DbError::Config("bad".to_string())),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Seed #2 failed:"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("Configuration error: bad"));
    }
}
