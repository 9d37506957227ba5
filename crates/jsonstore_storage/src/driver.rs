//! Parameterized statement executor over one SQLite connection.

use crate::error::{StorageError, StorageResult};
use crate::statement::{quote_ident, Row, SqlValue, Statement};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the SQL function that lowercases text with full Unicode rules.
///
/// The built-in `lower` and `LIKE` only fold ASCII letters.
pub const CASEFOLD_FUNCTION: &str = "casefold";

/// Lowercases text the same way [`CASEFOLD_FUNCTION`] does inside SQL.
#[must_use]
pub fn casefold(text: &str) -> String {
    text.to_lowercase()
}

/// SQLite journal modes a store may be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal header zeroed after each transaction.
    Persist,
    /// Journal kept in memory.
    Memory,
    /// Write-ahead log.
    #[default]
    Wal,
    /// No journal; rollback is unavailable.
    Off,
}

impl JournalMode {
    /// Pragma keyword for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options applied when a connection is opened.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// How long the engine waits on a busy database file.
    pub busy_timeout: Duration,
    /// Journal mode set on open.
    pub journal_mode: JournalMode,
    /// Whether to create the database file if it does not exist.
    pub create_if_missing: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            journal_mode: JournalMode::default(),
            create_if_missing: true,
        }
    }
}

/// Thin statement driver bound to one connection.
///
/// The driver is not `Sync`; a store hands it to exactly one operation lane
/// which owns it for its whole life. At most one transaction is open at a
/// time, tracked explicitly so misuse is reported instead of nesting.
pub struct SqliteDriver {
    conn: Option<Connection>,
    path: Option<PathBuf>,
    in_transaction: bool,
    last_error: Option<String>,
}

impl SqliteDriver {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path, options: &DriverOptions) -> StorageResult<Self> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if options.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(options.busy_timeout)?;
        register_functions(&conn)?;
        // journal_mode returns a row, so it goes through query_row
        let mode: String = conn.query_row(
            &format!("PRAGMA journal_mode={}", options.journal_mode),
            [],
            |row| row.get(0),
        )?;
        debug!(path = %path.display(), journal_mode = %mode, "opened store connection");

        Ok(Self {
            conn: Some(conn),
            path: Some(path.to_path_buf()),
            in_transaction: false,
            last_error: None,
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        Ok(Self {
            conn: Some(conn),
            path: None,
            in_transaction: false,
            last_error: None,
        })
    }

    /// Path of the backing file, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether a transaction is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// The last error message reported by the engine, for diagnostics.
    #[must_use]
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Closes the connection, rolling back any open transaction.
    ///
    /// Closing an already closed driver is a no-op.
    pub fn close(&mut self) -> StorageResult<()> {
        if self.in_transaction {
            warn!("closing store with an open transaction; rolling back");
            self.rollback()?;
        }
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| self.record(e)),
            None => Ok(()),
        }
    }

    /// Executes a statement, returning the number of affected rows.
    pub fn execute(&mut self, stmt: &Statement) -> StorageResult<usize> {
        let result = self
            .conn()?
            .execute(stmt.sql(), params_from_iter(stmt.params().iter()));
        result.map_err(|e| self.record(e))
    }

    /// Executes one or more parameterless statements (DDL).
    pub fn execute_batch(&mut self, sql: &str) -> StorageResult<()> {
        let result = self.conn()?.execute_batch(sql);
        result.map_err(|e| self.record(e))
    }

    /// Executes an insert and returns the new row id.
    pub fn insert(&mut self, stmt: &Statement) -> StorageResult<i64> {
        self.execute(stmt)?;
        Ok(self.conn()?.last_insert_rowid())
    }

    /// Executes an update and returns the number of changed rows.
    pub fn update(&mut self, stmt: &Statement) -> StorageResult<usize> {
        self.execute(stmt)
    }

    /// Executes a delete and returns the number of removed rows.
    pub fn delete(&mut self, stmt: &Statement) -> StorageResult<usize> {
        self.execute(stmt)
    }

    /// Runs a query and collects every row.
    pub fn select(&mut self, stmt: &Statement) -> StorageResult<Vec<Row>> {
        let conn = self.conn()?;
        let result = (|| -> rusqlite::Result<Vec<Row>> {
            let mut prepared = conn.prepare_cached(stmt.sql())?;
            let columns = prepared.column_count();
            let rows = prepared.query_map(params_from_iter(stmt.params().iter()), |row| {
                (0..columns)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map(Row)
            })?;
            rows.collect()
        })();
        result.map_err(|e| self.record(e))
    }

    /// Runs a query and returns its first row, if any.
    pub fn select_one(&mut self, stmt: &Statement) -> StorageResult<Option<Row>> {
        Ok(self.select(stmt)?.into_iter().next())
    }

    /// Runs a `COUNT(*)`-style query and returns the first column.
    pub fn select_count(&mut self, stmt: &Statement) -> StorageResult<i64> {
        Ok(self
            .select_one(stmt)?
            .and_then(|row| row.integer(0))
            .unwrap_or(0))
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TransactionActive`] if one is already open.
    pub fn begin(&mut self) -> StorageResult<()> {
        if self.in_transaction {
            return Err(StorageError::TransactionActive);
        }
        self.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commits the open transaction.
    pub fn commit(&mut self) -> StorageResult<()> {
        if !self.in_transaction {
            return Err(StorageError::NoTransaction);
        }
        self.execute_batch("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    /// Rolls back the open transaction.
    pub fn rollback(&mut self) -> StorageResult<()> {
        if !self.in_transaction {
            return Err(StorageError::NoTransaction);
        }
        // The engine may already have rolled back on its own (e.g. SQLITE_FULL);
        // either way no transaction is open afterwards.
        self.in_transaction = false;
        if self.conn()?.is_autocommit() {
            return Ok(());
        }
        self.execute_batch("ROLLBACK")
    }

    /// Whether a table with the given name exists.
    pub fn table_exists(&mut self, table: &str) -> StorageResult<bool> {
        let stmt = Statement::new(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table.to_string());
        Ok(self.select_count(&stmt)? > 0)
    }

    /// Column names of a table in declaration order.
    pub fn table_columns(&mut self, table: &str) -> StorageResult<Vec<String>> {
        let stmt = Statement::new(format!("PRAGMA table_info({})", quote_ident(table)));
        Ok(self
            .select(&stmt)?
            .iter()
            .filter_map(|row| row.text(1).map(str::to_string))
            .collect())
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    fn record(&mut self, error: rusqlite::Error) -> StorageError {
        let err = StorageError::from(error);
        if let StorageError::Sqlite { message, .. } = &err {
            debug!(error = %message, "statement failed");
            self.last_error = Some(message.clone());
        }
        err
    }
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        CASEFOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(casefold(&String::from_utf8_lossy(bytes)))
                }
            })
        },
    )
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl Drop for SqliteDriver {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close store connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> SqliteDriver {
        let mut d = SqliteDriver::open_in_memory().unwrap();
        d.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, n INTEGER)")
            .unwrap();
        d
    }

    fn insert(d: &mut SqliteDriver, name: &str, n: i64) -> i64 {
        d.insert(
            &Statement::new("INSERT INTO t (name, n) VALUES (?, ?)")
                .bind(name.to_string())
                .bind(n),
        )
        .unwrap()
    }

    #[test]
    fn insert_select_update_delete() {
        let mut d = driver();
        let a = insert(&mut d, "ann", 30);
        let b = insert(&mut d, "bob", 25);
        assert!(b > a);

        let rows = d
            .select(&Statement::new("SELECT name, n FROM t WHERE n > ? ORDER BY id").bind(20i64))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(0), Some("ann"));

        let changed = d
            .update(&Statement::new("UPDATE t SET n = ? WHERE id = ?").bind(31i64).bind(a))
            .unwrap();
        assert_eq!(changed, 1);

        let removed = d
            .delete(&Statement::new("DELETE FROM t WHERE id = ?").bind(b))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(d.select_count(&Statement::new("SELECT COUNT(*) FROM t")).unwrap(), 1);
    }

    #[test]
    fn values_are_bound_not_interpolated() {
        let mut d = driver();
        insert(&mut d, "x'); DROP TABLE t; --", 1);
        assert!(d.table_exists("t").unwrap());
        let row = d
            .select_one(&Statement::new("SELECT name FROM t"))
            .unwrap()
            .unwrap();
        assert_eq!(row.text(0), Some("x'); DROP TABLE t; --"));
    }

    #[test]
    fn rollback_discards_changes() {
        let mut d = driver();
        d.begin().unwrap();
        insert(&mut d, "ann", 1);
        d.rollback().unwrap();
        assert_eq!(d.select_count(&Statement::new("SELECT COUNT(*) FROM t")).unwrap(), 0);

        d.begin().unwrap();
        insert(&mut d, "bob", 2);
        d.commit().unwrap();
        assert_eq!(d.select_count(&Statement::new("SELECT COUNT(*) FROM t")).unwrap(), 1);
    }

    #[test]
    fn transactions_do_not_nest() {
        let mut d = driver();
        d.begin().unwrap();
        assert!(matches!(d.begin(), Err(StorageError::TransactionActive)));
        d.commit().unwrap();
        assert!(matches!(d.commit(), Err(StorageError::NoTransaction)));
        assert!(matches!(d.rollback(), Err(StorageError::NoTransaction)));
    }

    #[test]
    fn errors_are_recorded() {
        let mut d = driver();
        assert!(d.last_error_message().is_none());
        let err = d.execute(&Statement::new("SELECT * FROM missing")).unwrap_err();
        assert!(matches!(err, StorageError::Sqlite { .. }));
        assert!(d.last_error_message().unwrap().contains("missing"));
    }

    #[test]
    fn closed_driver_rejects_statements() {
        let mut d = driver();
        d.close().unwrap();
        assert!(!d.is_open());
        assert!(matches!(
            d.execute(&Statement::new("SELECT 1")),
            Err(StorageError::Closed)
        ));
        d.close().unwrap();
    }

    #[test]
    fn table_introspection() {
        let mut d = driver();
        assert!(d.table_exists("t").unwrap());
        assert!(!d.table_exists("nope").unwrap());
        assert_eq!(d.table_columns("t").unwrap(), vec!["id", "name", "n"]);
    }

    #[test]
    fn casefold_handles_non_ascii() {
        let mut d = driver();
        insert(&mut d, "Émile", 1);
        insert(&mut d, "Ölaf", 2);
        let like = |d: &mut SqliteDriver, pattern: &str| {
            d.select_count(
                &Statement::new("SELECT COUNT(*) FROM t WHERE casefold(name) LIKE ?")
                    .bind(casefold(pattern)),
            )
            .unwrap()
        };
        assert_eq!(like(&mut d, "%ÉMI%"), 1);
        assert_eq!(like(&mut d, "%émi%"), 1);
        assert_eq!(like(&mut d, "%öLA%"), 1);
        assert_eq!(like(&mut d, "%emi%"), 0);

        let row = d
            .select_one(&Statement::new("SELECT casefold(NULL), casefold(CAST(7 AS TEXT))"))
            .unwrap()
            .unwrap();
        assert_eq!(row.0[0], SqlValue::Null);
        assert_eq!(row.text(1), Some("7"));
    }

    #[test]
    fn journal_mode_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let options = DriverOptions {
            journal_mode: JournalMode::Truncate,
            ..DriverOptions::default()
        };
        let mut d = SqliteDriver::open(&dir.path().join("j.sqlite"), &options).unwrap();
        let row = d
            .select_one(&Statement::new("PRAGMA journal_mode"))
            .unwrap()
            .unwrap();
        assert_eq!(row.text(0).map(str::to_ascii_uppercase).as_deref(), Some("TRUNCATE"));
        assert_eq!(JournalMode::default().to_string(), "WAL");
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        {
            let mut d = SqliteDriver::open(&path, &DriverOptions::default()).unwrap();
            d.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)").unwrap();
            d.execute(
                &Statement::new("INSERT INTO kv VALUES (?, ?)")
                    .bind("a".to_string())
                    .bind("1".to_string()),
            )
            .unwrap();
        }
        let mut d = SqliteDriver::open(&path, &DriverOptions::default()).unwrap();
        let row = d
            .select_one(&Statement::new("SELECT v FROM kv WHERE k = ?").bind("a".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(row.text(0), Some("1"));
    }
}
