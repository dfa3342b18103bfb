//! Integration tests for the SQLite driver
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use litepool_core::{Connection, DatabaseDriver, LitepoolError, OpenOptions, Value};
use litepool_sqlite::SqliteDriver;

fn writable() -> OpenOptions {
    OpenOptions {
        busy_timeout: Duration::from_millis(5000),
        ..Default::default()
    }
}

#[test]
fn test_file_must_exist_rejects_missing_database() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing.db");
    let options = OpenOptions {
        file_must_exist: true,
        ..writable()
    };

    let result = SqliteDriver::new().open(path.to_str().context("utf-8 path")?, &options);

    assert!(matches!(result, Err(LitepoolError::Connection(_))));
    assert!(!path.exists(), "driver must not create the file");
    Ok(())
}

#[test]
fn test_readonly_connection_rejects_writes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ro.db");
    let path = path.to_str().context("utf-8 path")?;
    // a read-only handle cannot create the WAL index, so stay on the rollback journal
    let driver = SqliteDriver::new().with_wal(false);

    let mut writer = driver.open(path, &writable())?;
    writer.exec("CREATE TABLE notes (body TEXT)")?;
    writer.close()?;

    let reader = driver.open(
        path,
        &OpenOptions {
            readonly: true,
            ..writable()
        },
    )?;
    let result = reader.execute("INSERT INTO notes (body) VALUES (?)", &[Value::from("x")]);
    assert!(matches!(result, Err(LitepoolError::Query(_))));

    let count = reader
        .query_row("SELECT COUNT(*) FROM notes", &[])?
        .context("count row")?;
    assert_eq!(count.get(0), Some(&Value::Int64(0)));
    Ok(())
}

#[test]
fn test_memory_flag_ignores_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("never-created.db");
    let options = OpenOptions {
        memory: true,
        ..writable()
    };

    let mut conn = SqliteDriver::new().open(path.to_str().context("utf-8 path")?, &options)?;
    conn.exec("CREATE TABLE t (x INTEGER)")?;

    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_verbose_sees_every_statement() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = seen.clone();
    let options = OpenOptions {
        verbose: Some(Arc::new(move |sql: &str| {
            sink.lock().unwrap().push(sql.to_string())
        })),
        ..writable()
    };

    let mut conn = SqliteDriver::new().open(":memory:", &options)?;
    conn.exec("CREATE TABLE t (x INTEGER)")?;
    conn.execute("INSERT INTO t (x) VALUES (?)", &[Value::Int64(1)])?;
    conn.query("SELECT x FROM t", &[])?;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "CREATE TABLE t (x INTEGER)".to_string(),
            "INSERT INTO t (x) VALUES (?)".to_string(),
            "SELECT x FROM t".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_insert_reports_last_rowid() -> anyhow::Result<()> {
    let mut conn = SqliteDriver::new().open(":memory:", &writable())?;
    conn.exec("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)")?;

    let first = conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("a")])?;
    let second = conn.execute("INSERT INTO users (name) VALUES (?)", &[Value::from("b")])?;

    assert_eq!(first.affected_rows, 1);
    assert_eq!(second.last_insert_rowid, first.last_insert_rowid + 1);
    Ok(())
}
