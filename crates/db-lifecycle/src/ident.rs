//! Identifier validation, quoting and literal escaping.
//!
//! SQL identifiers (database names, table names) cannot be passed as
//! parameters in prepared statements - only data values can be parameterized.
//! Administrative statements (`CREATE DATABASE`, `TRUNCATE TABLE`, ...) are
//! not preparable at all on most engines, so even some values end up inlined.
//!
//! To safely construct dynamic SQL we:
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply engine-specific quoting (double quotes, backticks)
//! 3. Escape special characters within the quotes
//!
//! This module also carries [`split_statements`], the quote- and comment-aware
//! splitter used to feed multi-statement migration files to drivers that
//! execute one statement per round trip.

use crate::error::{DbError, Result};

/// Maximum identifier length (conservative limit across engines).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite: effectively unlimited
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `DbError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(DbError::Config(format!(
            "Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DbError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL (or SQLite) identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
/// Validates the identifier before quoting.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Escape a string literal for PostgreSQL or SQLite by doubling single quotes.
///
/// The caller wraps the result in single quotes.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escape a string literal for MySQL.
///
/// MySQL treats backslash as an escape character inside literals (unless
/// `NO_BACKSLASH_ESCAPES` is set), so backslashes are doubled in addition to
/// single quotes.
pub fn escape_mysql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Split a SQL script into individual statements on top-level semicolons.
///
/// String literals (single-quoted, double-quoted, backtick-quoted), line
/// comments (`--`, `#`) and block comments are respected: a semicolon inside
/// any of them does not split. Backslash escapes inside single- and
/// double-quoted strings are honored for MySQL scripts. Empty statements are
/// dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum State {
        Normal,
        SingleQuote,
        DoubleQuote,
        Backtick,
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                ';' => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                }
                '\'' => {
                    state = State::SingleQuote;
                    current.push(c);
                }
                '"' => {
                    state = State::DoubleQuote;
                    current.push(c);
                }
                '`' => {
                    state = State::Backtick;
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = State::LineComment;
                    current.push(c);
                }
                '#' => {
                    state = State::LineComment;
                    current.push(c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                    current.push(c);
                }
                _ => current.push(c),
            },
            State::SingleQuote | State::DoubleQuote => {
                current.push(c);
                let quote = if state == State::SingleQuote { '\'' } else { '"' };
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                } else if c == quote {
                    if chars.peek() == Some(&quote) {
                        // Doubled quote stays inside the literal.
                        if let Some(doubled) = chars.next() {
                            current.push(doubled);
                        }
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Backtick => {
                current.push(c);
                if c == '`' {
                    if chars.peek() == Some(&'`') {
                        if let Some(doubled) = chars.next() {
                            current.push(doubled);
                        }
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                current.push(c);
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                current.push(c);
                if c == '*' && chars.peek() == Some(&'/') {
                    if let Some(slash) = chars.next() {
                        current.push(slash);
                    }
                    state = State::Normal;
                }
            }
        }
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("Table123").is_ok());
        assert!(validate_identifier("name with spaces").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    // =========================================================================
    // Quoting tests
    // =========================================================================

    #[test]
    fn test_quote_pg_normal() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("User").unwrap(), "\"User\"");
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let result = quote_pg("Robert'); DROP TABLE Students;--");
        assert_eq!(result.unwrap(), "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_quote_mysql_normal() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn test_quote_rejects_invalid() {
        assert!(quote_pg("").is_err());
        assert!(quote_mysql("table\0name").is_err());
    }

    // =========================================================================
    // Literal escaping tests
    // =========================================================================

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("a'b'c"), "a''b''c");
        // Backslashes pass through untouched for PostgreSQL/SQLite.
        assert_eq!(escape_literal("C:\\temp"), "C:\\temp");
    }

    #[test]
    fn test_escape_mysql_literal() {
        assert_eq!(escape_mysql_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_mysql_literal("C:\\temp"), "C:\\\\temp");
        assert_eq!(escape_mysql_literal("\\'"), "\\\\''");
    }

    // =========================================================================
    // Statement splitting tests
    // =========================================================================

    #[test]
    fn test_split_statements_basic() {
        let sql = "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a (id INT)");
        assert_eq!(stmts[1], "CREATE TABLE b (id INT)");
    }

    #[test]
    fn test_split_statements_no_trailing_semicolon() {
        let stmts = split_statements("SELECT 1");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_split_statements_semicolon_in_string() {
        let sql = "INSERT INTO t (v) VALUES ('a;b');INSERT INTO t (v) VALUES ('c')";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t (v) VALUES ('a;b')");
    }

    #[test]
    fn test_split_statements_escaped_quote_in_string() {
        let sql = "INSERT INTO t (v) VALUES ('it''s; fine'); SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t (v) VALUES ('it''s; fine')");
    }

    #[test]
    fn test_split_statements_backslash_escape() {
        let sql = "INSERT INTO t (v) VALUES ('a\\';b');SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t (v) VALUES ('a\\';b')");
    }

    #[test]
    fn test_split_statements_comments() {
        let sql = "-- leading; comment\nSELECT 1;\n/* block; comment */ SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("SELECT 1"));
        assert!(stmts[1].contains("SELECT 2"));
    }

    #[test]
    fn test_split_statements_backtick_ident() {
        let sql = "CREATE TABLE `odd;name` (id INT); SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE `odd;name` (id INT)");
    }

    #[test]
    fn test_split_statements_drops_empty() {
        let stmts = split_statements(";;  ;\n;");
        assert!(stmts.is_empty());
    }
}
