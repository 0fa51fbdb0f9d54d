//! End-to-end tests over the bundled SQLite engine.
//!
//! These exercise the shared operations (migrations, schema version,
//! seeding, close/reopen) without needing a database server.

use std::fs;
use std::path::Path;

use futures::future::BoxFuture;

use db_lifecycle::{
    Config, DatabaseManager, DatabaseManagerImpl, DbError, Result, SeedFn, TenantConn,
};

const USERS_MIGRATION: &str = r#"
CREATE TABLE "User" (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT NOT NULL UNIQUE,
  email TEXT
);
"#;

const IGNOREME_MIGRATION: &str = r#"
CREATE TABLE "Ignoreme" (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  description TEXT
);
INSERT INTO "Ignoreme" (description) VALUES ('kept');
"#;

fn write_migrations(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("20150623130922_create_users.sql"), USERS_MIGRATION).unwrap();
    fs::write(
        dir.join("20150623130923_create_ignoreme.sql"),
        IGNOREME_MIGRATION,
    )
    .unwrap();
    // Non-SQL files are ignored by the runner.
    fs::write(dir.join("README.md"), "not a migration").unwrap();
}

fn manager_for(root: &Path) -> DatabaseManagerImpl {
    let config = Config::from_yaml(&format!(
        r#"
dialect: sqlite
connection:
  database: {db}
  migrations_directory: {migrations}
"#,
        db = root.join("app.db").display(),
        migrations = root.join("migrations").display()
    ))
    .unwrap();
    DatabaseManagerImpl::from_config(config).unwrap()
}

fn seed<F>(f: F) -> SeedFn
where
    F: for<'a> Fn(&'a mut TenantConn) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    Box::new(f)
}

#[tokio::test]
async fn test_version_and_migrate_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(&dir.path().join("migrations"));
    let manager = manager_for(dir.path());

    assert_eq!(manager.db_version().await.unwrap(), "none");

    assert_eq!(manager.migrate_db().await.unwrap(), 2);
    assert_eq!(manager.db_version().await.unwrap(), "20150623130923");

    // Re-running applies nothing.
    assert_eq!(manager.migrate_db().await.unwrap(), 0);
    assert_eq!(manager.db_version().await.unwrap(), "20150623130923");

    // The row seeded by the second migration is present.
    let mut conn = manager.tenant().await.unwrap();
    let rows = conn
        .query_strings(r#"SELECT description FROM "Ignoreme""#)
        .await
        .unwrap();
    assert_eq!(rows, vec!["kept".to_string()]);

    manager.close().await;
}

#[tokio::test]
async fn test_populate_db_runs_seeds_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(&dir.path().join("migrations"));
    let manager = manager_for(dir.path());
    manager.migrate_db().await.unwrap();

    let seeds: Vec<SeedFn> = vec![
        seed(|conn| {
            Box::pin(async move {
                conn.batch_execute(
                    r#"INSERT INTO "User" (username, email) VALUES ('alice', 'alice@example.org')"#,
                )
                .await
            })
        }),
        seed(|conn| {
            Box::pin(async move {
                conn.batch_execute(
                    r#"INSERT INTO "User" (username, email) VALUES ('bob', 'bob@example.org')"#,
                )
                .await
            })
        }),
    ];
    manager.populate_db(&seeds).await.unwrap();

    let mut conn = manager.tenant().await.unwrap();
    let names = conn
        .query_strings(r#"SELECT username FROM "User" ORDER BY id"#)
        .await
        .unwrap();
    assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn test_populate_db_aborts_on_failing_seed() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(&dir.path().join("migrations"));
    let manager = manager_for(dir.path());
    manager.migrate_db().await.unwrap();

    let seeds: Vec<SeedFn> = vec![
        seed(|conn| {
            Box::pin(async move {
                conn.batch_execute(r#"INSERT INTO "User" (username) VALUES ('alice')"#)
                    .await
            })
        }),
        seed(|conn| {
            Box::pin(async move {
                conn.batch_execute(r#"INSERT INTO "User" (username) VALUES ('bob')"#)
                    .await?;
                conn.batch_execute("INSERT INTO missing_table (x) VALUES (1)")
                    .await
            })
        }),
    ];

    let err = manager.populate_db(&seeds).await.unwrap_err();
    match err {
        DbError::Seed { index, .. } => assert_eq!(index, 1),
        other => panic!("expected seed error, got {}", other),
    }

    // The first seed committed; the failing one rolled back entirely.
    let mut conn = manager.tenant().await.unwrap();
    let names = conn
        .query_strings(r#"SELECT username FROM "User" ORDER BY id"#)
        .await
        .unwrap();
    assert_eq!(names, vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_failing_migration_names_file_and_keeps_applied() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    write_migrations(&migrations);
    fs::write(migrations.join("20150623130924_broken.sql"), "CREATE TABLE (").unwrap();
    let manager = manager_for(dir.path());

    let err = manager.migrate_db().await.unwrap_err();
    match err {
        DbError::Migration { file, .. } => assert_eq!(file, "20150623130924_broken"),
        other => panic!("expected migration error, got {}", other),
    }

    // Everything before the broken file stayed applied.
    assert_eq!(manager.db_version().await.unwrap(), "20150623130923");
}

#[tokio::test]
async fn test_migrate_without_directory_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_yaml(&format!(
        "dialect: sqlite\nconnection:\n  database: {}\n",
        dir.path().join("app.db").display()
    ))
    .unwrap();
    let manager = DatabaseManagerImpl::from_config(config).unwrap();

    let err = manager.migrate_db().await.unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
    assert!(err.to_string().contains("migrations_directory"));
}

#[tokio::test]
async fn test_usable_after_close() {
    let dir = tempfile::tempdir().unwrap();
    write_migrations(&dir.path().join("migrations"));
    let manager = manager_for(dir.path());
    manager.migrate_db().await.unwrap();

    manager.close().await;

    // Shared operations reconnect transparently after close.
    assert_eq!(manager.db_version().await.unwrap(), "20150623130923");

    // Repeated close is fine.
    manager.close().await;
    manager.close().await;
}

#[tokio::test]
async fn test_admin_operations_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(dir.path());

    let err = manager.create_db(None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "create_db is not supported for the sqlite dialect"
    );

    let err = manager.truncate_db(&[]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "truncate_db is not supported for the sqlite dialect"
    );
}
