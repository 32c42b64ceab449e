//! SQLite store backend built on `rusqlite`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter};
use tracing::debug;

use sqldrill_error::QueryError;

use crate::dialect;
use crate::store::{AccessMode, SqlStore, StoreConnector};
use crate::value::{ResultSet, SqlValue};

/// VM instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// Named shared-cache in-memory database. It lives as long as at least
    /// one connection to it is open.
    Memory { name: String },
    File(PathBuf),
}

impl DatabaseTarget {
    /// Fresh in-memory database with a process-unique name.
    #[must_use]
    pub fn unique_memory() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        Self::Memory {
            name: format!("sqldrill-{}-{n}", std::process::id()),
        }
    }

    /// `":memory:"` (or empty) selects a fresh in-memory database; anything
    /// else is a file path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == ":memory:" {
            Self::unique_memory()
        } else {
            Self::File(PathBuf::from(raw))
        }
    }
}

/// Connection parameters for [`SqliteConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub target: DatabaseTarget,
    /// Extra `PRAGMA` statements run on every new connection.
    pub pragmas: Vec<String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            target: DatabaseTarget::unique_memory(),
            pragmas: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    config: SqliteConfig,
}

impl SqliteConnector {
    #[must_use]
    pub const fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SqliteConfig {
            target: DatabaseTarget::File(path.into()),
            pragmas: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match &self.config.target {
            DatabaseTarget::Memory { name } => Connection::open_with_flags(
                format!("file:{name}?mode=memory&cache=shared"),
                flags,
            ),
            DatabaseTarget::File(path) => Connection::open_with_flags(path, flags),
        }
    }
}

impl StoreConnector for SqliteConnector {
    type Store = SqliteStore;

    fn connect(&self, mode: AccessMode) -> Result<SqliteStore, QueryError> {
        let conn = self
            .open()
            .map_err(|e| QueryError::connection(format!("{}: {e}", self.describe())))?;
        dialect::install(&conn).map_err(|e| QueryError::connection(e.to_string()))?;
        for pragma in &self.config.pragmas {
            conn.execute_batch(&format!("PRAGMA {pragma};"))
                .map_err(|e| QueryError::connection(format!("PRAGMA {pragma}: {e}")))?;
        }
        if mode == AccessMode::ReadOnly {
            conn.execute_batch("PRAGMA query_only = ON;")
                .map_err(|e| QueryError::connection(e.to_string()))?;
        }
        debug!(store = %self.describe(), ?mode, "opened sqlite session");
        Ok(SqliteStore { conn, mode })
    }

    fn describe(&self) -> String {
        match &self.config.target {
            DatabaseTarget::Memory { name } => format!("sqlite memory:{name}"),
            DatabaseTarget::File(path) => format!("sqlite file:{}", path.display()),
        }
    }
}

/// One SQLite connection with the MySQL shim installed.
pub struct SqliteStore {
    conn: Connection,
    mode: AccessMode,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    fn collect_rows(&self, sql: &str) -> rusqlite::Result<ResultSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_sqlite(row.get::<_, Value>(idx)?));
            }
            rows.push(values);
        }
        Ok(ResultSet::new(columns, rows))
    }
}

impl SqlStore for SqliteStore {
    fn engine_name(&self) -> &'static str {
        "sqlite"
    }

    fn execute(&mut self, statements: &str) -> Result<(), QueryError> {
        self.conn
            .execute_batch(statements)
            .map_err(|e| QueryError::rejected(e.to_string()))
    }

    fn query(&mut self, sql: &str, timeout: Duration) -> Result<ResultSet, QueryError> {
        let translated = dialect::translate(sql.trim().trim_end_matches(';'));
        let started = Instant::now();
        let deadline = started + timeout;
        self.conn
            .progress_handler(PROGRESS_INTERVAL_OPS, Some(move || Instant::now() >= deadline));
        let result = self.collect_rows(&translated);
        self.conn.progress_handler(0, None::<fn() -> bool>);
        result.map_err(|err| {
            if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
                QueryError::Timeout {
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                QueryError::rejected(err.to_string())
            }
        })
    }

    fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<usize, QueryError> {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(table)
        );
        let reject = |e: rusqlite::Error| QueryError::rejected(e.to_string());

        let tx = self.conn.transaction().map_err(reject)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(reject)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter().map(to_sqlite)))
                    .map_err(reject)?;
            }
        }
        tx.commit().map_err(reject)?;
        Ok(rows.len())
    }

    fn begin_read(&mut self) -> Result<(), QueryError> {
        self.execute("BEGIN DEFERRED")
    }
}

/// Double-quote an identifier for SQLite.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Real(r) => Value::Real(*r),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sqlite(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(r) => SqlValue::Real(r),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn seeded() -> (SqliteConnector, SqliteStore) {
        let connector = SqliteConnector::in_memory();
        let mut writer = connector.connect(AccessMode::ReadWrite).unwrap();
        writer
            .execute("CREATE TABLE dogs (dog_guid TEXT, weight INTEGER, created_at DATETIME)")
            .unwrap();
        let inserted = writer
            .insert_rows(
                "dogs",
                &["dog_guid".into(), "weight".into(), "created_at".into()],
                &[
                    vec!["d-1".into(), 70.into(), "2013-10-01 10:00:00".into()],
                    vec!["d-2".into(), SqlValue::Null, "2013-11-05 10:00:00".into()],
                ],
            )
            .unwrap();
        assert_eq!(inserted, 2);
        (connector, writer)
    }

    #[test]
    fn query_returns_columns_and_rows() {
        let (_connector, mut writer) = seeded();
        let rs = writer
            .query("SELECT dog_guid, weight FROM dogs ORDER BY dog_guid;", TIMEOUT)
            .unwrap();
        assert_eq!(rs.columns, vec!["dog_guid", "weight"]);
        assert_eq!(rs.rows[0], vec![SqlValue::from("d-1"), SqlValue::Integer(70)]);
        assert_eq!(rs.rows[1][1], SqlValue::Null);
    }

    #[test]
    fn read_only_session_sees_writer_data_and_refuses_writes() {
        let (connector, _writer) = seeded();
        let mut reader = connector.connect(AccessMode::ReadOnly).unwrap();
        assert_eq!(reader.mode(), AccessMode::ReadOnly);
        reader.begin_read().unwrap();
        let rs = reader.query("SELECT COUNT(*) FROM dogs", TIMEOUT).unwrap();
        assert_eq!(rs.rows[0][0], SqlValue::Integer(2));
        reader.end_read().unwrap();

        let err = reader.query("DELETE FROM dogs", TIMEOUT).unwrap_err();
        assert!(matches!(err, QueryError::Rejected { .. }), "{err:?}");
    }

    #[test]
    fn mysql_syntax_runs() {
        let (_connector, mut writer) = seeded();
        let rs = writer
            .query(
                r#"SELECT MONTH(created_at) AS Month, IF(weight IS NULL, "unknown", "known") AS w
                   FROM dogs ORDER BY Month"#,
                TIMEOUT,
            )
            .unwrap();
        assert_eq!(rs.rows[0], vec![SqlValue::Integer(10), SqlValue::from("known")]);
        assert_eq!(rs.rows[1], vec![SqlValue::Integer(11), SqlValue::from("unknown")]);
    }

    #[test]
    fn syntax_error_is_rejected() {
        let (_connector, mut writer) = seeded();
        let err = writer
            .query("SELECT dog_guid, FROM dogs", TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, QueryError::Rejected { ref message } if message.contains("syntax")));
        let err = writer.query("SELECT * FROM missing", TIMEOUT).unwrap_err();
        assert!(matches!(err, QueryError::Rejected { ref message } if message.contains("missing")));
    }

    #[test]
    fn runaway_query_times_out() {
        let (_connector, mut writer) = seeded();
        let err = writer
            .query(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
        // The handler is cleared afterwards.
        assert!(writer.query("SELECT 1", TIMEOUT).is_ok());
    }

    #[test]
    fn file_database_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::file(dir.path().join("drill.db"));
        {
            let mut writer = connector.connect(AccessMode::ReadWrite).unwrap();
            writer.execute("CREATE TABLE t (x INTEGER)").unwrap();
            writer.insert_rows("t", &["x".into()], &[vec![1.into()]]).unwrap();
        }
        let mut reader = connector.connect(AccessMode::ReadOnly).unwrap();
        let rs = reader.query("SELECT x FROM t", TIMEOUT).unwrap();
        assert_eq!(rs.row_count(), 1);
        assert!(connector.describe().ends_with("drill.db"));
    }

    #[test]
    fn memory_targets_are_isolated() {
        let (_first, _writer) = seeded();
        let other = SqliteConnector::in_memory();
        let mut session = other.connect(AccessMode::ReadOnly).unwrap();
        assert!(session.query("SELECT * FROM dogs", TIMEOUT).is_err());
    }

    #[test]
    fn target_parsing() {
        assert!(matches!(DatabaseTarget::parse(":memory:"), DatabaseTarget::Memory { .. }));
        assert!(matches!(DatabaseTarget::parse(""), DatabaseTarget::Memory { .. }));
        assert_eq!(
            DatabaseTarget::parse("/tmp/x.db"),
            DatabaseTarget::File(PathBuf::from("/tmp/x.db"))
        );
        assert_ne!(DatabaseTarget::unique_memory(), DatabaseTarget::unique_memory());
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
