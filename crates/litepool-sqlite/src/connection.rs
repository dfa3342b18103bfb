//! SQLite connection implementation

use litepool_core::{
    Connection, LitepoolError, OpenOptions, QueryResult, Result, Row, StatementResult, Value,
    is_memory_path,
};
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// SQLite connection wrapper
///
/// The rusqlite handle is dropped on `close`; every SQL method fails with a
/// connection error afterwards.
pub struct SqliteConnection {
    conn: Option<RusqliteConnection>,
    path: String,
    options: OpenOptions,
}

impl SqliteConnection {
    /// Open a SQLite database with default options
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, &OpenOptions::default(), true)
    }

    /// Open a SQLite database
    ///
    /// `wal` switches writable file databases to WAL journaling so pooled
    /// readers do not block on a writer.
    pub(crate) fn open_with(path: &str, options: &OpenOptions, wal: bool) -> Result<Self> {
        tracing::info!(path = %path, readonly = options.readonly, "opening SQLite database");

        // rusqlite panics on busy timeouts that overflow SQLite's int milliseconds
        if i32::try_from(options.busy_timeout.as_millis()).is_err() {
            return Err(LitepoolError::Configuration(format!(
                "Busy timeout too large: {:?}",
                options.busy_timeout
            )));
        }

        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if options.readonly {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if !options.file_must_exist {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }

        let in_memory = options.memory || is_memory_path(path);
        let (conn, resolved) = if in_memory {
            let conn = RusqliteConnection::open_in_memory_with_flags(flags).map_err(|e| {
                LitepoolError::Connection(format!("Failed to open in-memory database: {}", e))
            })?;
            (conn, path.to_string())
        } else {
            let expanded_path = Self::expand_path(path)?;

            if options.file_must_exist
                && !expanded_path.starts_with("file:")
                && !std::path::Path::new(&expanded_path).exists()
            {
                return Err(LitepoolError::Connection(format!(
                    "Database file does not exist: {}",
                    expanded_path
                )));
            }

            let conn = RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                LitepoolError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?;
            (conn, expanded_path)
        };

        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| LitepoolError::Connection(format!("Failed to set busy timeout: {}", e)))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| LitepoolError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

        if wal && !in_memory && !options.readonly {
            // journal_mode answers with the resulting mode, so it needs the checked variant
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(|e| {
                    LitepoolError::Connection(format!("Failed to set journal mode: {}", e))
                })?;
            tracing::debug!(journal_mode = %mode, "journal mode configured");
        }

        tracing::info!(path = %resolved, "SQLite database connection established");
        Ok(Self {
            conn: Some(conn),
            path: resolved,
            options: options.clone(),
        })
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match std::env::var_os("HOME") {
                Some(home) => std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string(),
                None => {
                    return Err(LitepoolError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(LitepoolError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        if path_buf.is_relative() {
            Ok(std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string())
        } else {
            Ok(expanded)
        }
    }

    /// Path the connection was opened with, after expansion
    pub fn path(&self) -> &str {
        &self.path
    }

    fn raw(&self) -> Result<&RusqliteConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| LitepoolError::Connection("Connection is closed".into()))
    }

    /// Execute multiple SQL statements in a batch
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.raw()?;
        self.options.trace(sql);

        conn.execute_batch(sql)
            .map_err(|e| LitepoolError::Query(format!("Failed to execute batch: {}", e)))
    }

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let conn = self.raw()?;
        self.options.trace(sql);
        let rusqlite_params = values_to_rusqlite(params);

        let rows_affected = conn
            .execute(sql, params_from_iter(rusqlite_params.iter()))
            .map_err(|e| LitepoolError::Query(format!("Failed to execute statement: {}", e)))?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            affected_rows: rows_affected as u64,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }

    /// Execute a query and collect every row
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let conn = self.raw()?;
        self.options.trace(sql);
        let rusqlite_params = values_to_rusqlite(params);

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| LitepoolError::Query(format!("Failed to prepare query: {}", e)))?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = Vec::new();
        let mut query_rows = stmt
            .query(params_from_iter(rusqlite_params.iter()))
            .map_err(|e| LitepoolError::Query(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = query_rows
            .next()
            .map_err(|e| LitepoolError::Query(format!("Failed to fetch row: {}", e)))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(rusqlite_to_value(row, i)?);
            }
            rows.push(Row::new(columns.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    /// Execute a query and return its first row, if any
    pub fn query_row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.rows.into_iter().next())
    }
}

impl Connection for SqliteConnection {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    fn exec(&mut self, sql: &str) -> Result<()> {
        self.execute_batch(sql)
    }

    fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        tracing::info!(path = %self.path, "closing SQLite connection");
        conn.close().map_err(|(_, e)| {
            LitepoolError::Connection(format!("Failed to close SQLite connection: {}", e))
        })
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| LitepoolError::Query(e.to_string()))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteConnection {
        SqliteConnection::open(":memory:").expect("open in-memory database")
    }

    #[test]
    fn test_transaction_state_tracks_begin_and_rollback() {
        let mut conn = memory();
        assert!(!conn.in_transaction());

        conn.exec("BEGIN").expect("begin");
        assert!(conn.in_transaction());

        conn.exec("ROLLBACK").expect("rollback");
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_closed_connection_rejects_queries() {
        let mut conn = memory();
        conn.close().expect("close");

        assert!(!conn.is_open());
        assert!(!conn.in_transaction());
        assert!(matches!(
            conn.query("SELECT 1", &[]),
            Err(LitepoolError::Connection(_))
        ));
        // closing twice is harmless
        conn.close().expect("second close");
    }

    #[test]
    fn test_value_round_trip_through_sqlite() {
        let conn = memory();
        conn.execute_batch("CREATE TABLE t (i INTEGER, f REAL, s TEXT, b BLOB, n TEXT)")
            .expect("create");
        conn.execute(
            "INSERT INTO t VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Int64(7),
                Value::Float64(1.5),
                Value::from("text"),
                Value::Bytes(vec![0xff, 0x00]),
                Value::Null,
            ],
        )
        .expect("insert");

        let row = conn
            .query_row("SELECT i, f, s, b, n FROM t", &[])
            .expect("select")
            .expect("one row");
        assert_eq!(
            row.values,
            vec![
                Value::Int64(7),
                Value::Float64(1.5),
                Value::String("text".into()),
                Value::Bytes(vec![0xff, 0x00]),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_oversized_busy_timeout_is_rejected() {
        let options = OpenOptions {
            busy_timeout: std::time::Duration::from_millis(3_000_000_000),
            ..Default::default()
        };

        let result = SqliteConnection::open_with(":memory:", &options, false);
        assert!(matches!(result, Err(LitepoolError::Configuration(_))));
    }

    #[test]
    fn test_expand_path_rejects_other_users_home() {
        assert!(matches!(
            SqliteConnection::expand_path("~bob/db.sqlite"),
            Err(LitepoolError::Configuration(_))
        ));
        assert_eq!(
            SqliteConnection::expand_path("file:test.db?mode=ro").expect("uri"),
            "file:test.db?mode=ro"
        );
    }
}
