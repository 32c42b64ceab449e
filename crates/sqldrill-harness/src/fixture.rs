//! Fixture documents and the loader that seeds them into a store.
//!
//! A fixture is a fixed schema plus seed rows. Loading is idempotent: every
//! table is dropped, recreated and reseeded, so two loads of the same document
//! leave the store in the same state.
//!
//! ```text
//! FixtureDocument ─validate─▶ FixtureLoader ─DROP/CREATE/INSERT/COUNT─▶ FixtureHandle
//!                                                                        │
//!                                                       read-only sessions for the runner
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use sqldrill_error::{FixtureError, QueryError};

use crate::dialect;
use crate::sqlite::quote_identifier;
use crate::store::{AccessMode, SqlStore, StoreConnector};
use crate::value::SqlValue;

/// Fixture file format understood by this build.
pub const FIXTURE_FORMAT_VERSION: u32 = 1;

/// Timeout for the post-load `COUNT(*)` queries.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

fn default_column_type() -> String {
    "TEXT".to_owned()
}

// ---------------------------------------------------------------------------
// Document format (JSON)
// ---------------------------------------------------------------------------

/// Column declaration. `type` is passed to `CREATE TABLE` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub sql_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }

    /// SQLite's text affinity rule: the declared type mentions CHAR, CLOB or
    /// TEXT. Date and time types keep numeric affinity.
    #[must_use]
    pub fn has_text_affinity(&self) -> bool {
        let upper = self.sql_type.to_ascii_uppercase();
        !upper.contains("INT")
            && ["CHAR", "CLOB", "TEXT"].iter().any(|k| upper.contains(k))
            && !upper.contains("COLLATE")
    }
}

/// Schema of one table without its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Seed rows keyed by table name.
pub type SeedData = BTreeMap<String, Vec<Vec<SqlValue>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub rows: Vec<Vec<SqlValue>>,
}

impl TableDef {
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Text columns get `COLLATE NOCASE`, matching MySQL's default
    /// case-insensitive collation for comparison, grouping and ordering.
    fn create_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = quote_identifier(&c.name);
                if c.has_text_affinity() {
                    format!("{name} {} COLLATE NOCASE", c.sql_type)
                } else {
                    format!("{name} {}", c.sql_type)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({columns})", quote_identifier(&self.name))
    }
}

/// Schema plus seed data, as stored in a fixture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDocument {
    pub format_version: u32,
    #[serde(default)]
    pub name: String,
    pub tables: Vec<TableDef>,
}

impl FixtureDocument {
    pub fn from_json_str(raw: &str) -> Result<Self, FixtureError> {
        serde_json::from_str(raw).map_err(|e| FixtureError::Parse {
            detail: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = Self::from_json_str(&raw).map_err(|err| match err {
            FixtureError::Parse { detail } => FixtureError::Parse {
                detail: format!("{}: {detail}", path.display()),
            },
            other => other,
        })?;
        if doc.name.is_empty() {
            doc.name = path
                .file_stem()
                .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        }
        Ok(doc)
    }

    /// Assemble a document from a schema and separately supplied seed rows.
    ///
    /// Tables missing from `seed` are created empty; seed rows for a table the
    /// schema does not declare are an error.
    pub fn from_parts(
        name: impl Into<String>,
        schema: &[TableSchema],
        seed: &SeedData,
    ) -> Result<Self, FixtureError> {
        if let Some(stray) = seed
            .keys()
            .find(|table| !schema.iter().any(|t| &t.name == *table))
        {
            return Err(FixtureError::Seed {
                table: stray.clone(),
                detail: "table is not declared in the schema".to_owned(),
            });
        }
        let tables = schema
            .iter()
            .map(|t| TableDef {
                name: t.name.clone(),
                columns: t.columns.clone(),
                rows: seed.get(&t.name).cloned().unwrap_or_default(),
            })
            .collect();
        Ok(Self {
            format_version: FIXTURE_FORMAT_VERSION,
            name: name.into(),
            tables,
        })
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Structural checks. Runs before anything touches the store.
    pub fn validate(&self) -> Result<(), FixtureError> {
        if self.format_version != FIXTURE_FORMAT_VERSION {
            return Err(FixtureError::UnsupportedVersion {
                found: self.format_version,
                supported: FIXTURE_FORMAT_VERSION,
            });
        }
        if self.tables.is_empty() {
            return Err(FixtureError::Empty {
                name: self.name.clone(),
            });
        }

        let mut seen_tables = HashSet::new();
        for table in &self.tables {
            check_identifier("table", &table.name)?;
            if !seen_tables.insert(table.name.to_ascii_lowercase()) {
                return Err(FixtureError::DuplicateTable {
                    name: table.name.clone(),
                });
            }
            if table.columns.is_empty() {
                return Err(FixtureError::Parse {
                    detail: format!("table {} declares no columns", table.name),
                });
            }

            let mut seen_columns = HashSet::new();
            for column in &table.columns {
                check_identifier("column", &column.name)?;
                check_column_type(&column.sql_type)?;
                if !seen_columns.insert(column.name.to_ascii_lowercase()) {
                    return Err(FixtureError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }

            if let Some((idx, row)) = table
                .rows
                .iter()
                .enumerate()
                .find(|(_, row)| row.len() != table.columns.len())
            {
                return Err(FixtureError::RowArity {
                    table: table.name.clone(),
                    row: idx + 1,
                    expected: table.columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(())
    }

    /// SHA-256 over the schema and every seed value, as lowercase hex.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.format_version.to_le_bytes());
        for table in &self.tables {
            hasher.update(b"\x00table\x00");
            hasher.update(table.name.as_bytes());
            for column in &table.columns {
                hasher.update(b"\x00col\x00");
                hasher.update(column.name.as_bytes());
                hasher.update(b" ");
                hasher.update(column.sql_type.as_bytes());
            }
            for row in &table.rows {
                hasher.update(b"\x00row");
                for value in row {
                    hasher.update(format!("\x00{value:?}").as_bytes());
                }
            }
        }
        let mut hex = String::with_capacity(64);
        for byte in hasher.finalize() {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

fn check_identifier(what: &'static str, name: &str) -> Result<(), FixtureError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FixtureError::InvalidIdentifier {
            what,
            name: name.to_owned(),
        })
    }
}

fn check_column_type(sql_type: &str) -> Result<(), FixtureError> {
    let valid = !sql_type.trim().is_empty()
        && sql_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','));
    if valid {
        Ok(())
    } else {
        Err(FixtureError::InvalidIdentifier {
            what: "column type",
            name: sql_type.to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Seeds fixture documents into the store reached through `C`.
#[derive(Debug, Clone)]
pub struct FixtureLoader<C> {
    connector: C,
}

impl<C: StoreConnector + Clone> FixtureLoader<C> {
    pub const fn new(connector: C) -> Self {
        Self { connector }
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Validate, connect, then drop/create/seed/verify every table.
    pub fn load(&self, document: &FixtureDocument) -> Result<FixtureHandle<C>, FixtureError> {
        document.validate()?;
        let started = Instant::now();
        info!(
            fixture = %document.name,
            tables = document.tables.len(),
            store = %self.connector.describe(),
            "loading fixture"
        );

        let mut writer = self.connect_writer()?;
        let mut seed_counts = BTreeMap::new();
        for table in &document.tables {
            seed_table(&mut writer, table)?;
            seed_counts.insert(table.name.clone(), table.rows.len());
        }
        verify_counts(&mut writer, &seed_counts, DEFAULT_VERIFY_TIMEOUT)?;

        let fingerprint = document.fingerprint();
        info!(
            fixture = %document.name,
            rows = document.total_rows(),
            fingerprint = %fingerprint,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "fixture ready"
        );
        Ok(FixtureHandle {
            connector: self.connector.clone(),
            writer,
            name: document.name.clone(),
            fingerprint,
            seed_counts,
        })
    }

    /// [`FixtureLoader::load`] for a schema and seed data kept apart.
    pub fn load_parts(
        &self,
        name: &str,
        schema: &[TableSchema],
        seed: &SeedData,
    ) -> Result<FixtureHandle<C>, FixtureError> {
        self.load(&FixtureDocument::from_parts(name, schema, seed)?)
    }

    /// Open the writer, allowing exactly one reconnect.
    fn connect_writer(&self) -> Result<C::Store, FixtureError> {
        match self.connector.connect(AccessMode::ReadWrite) {
            Ok(store) => Ok(store),
            Err(first) => {
                warn!(error = %first, "store connection failed; retrying once");
                self.connector
                    .connect(AccessMode::ReadWrite)
                    .map_err(|second| FixtureError::Unreachable {
                        detail: format!("{second} (first attempt: {first})"),
                    })
            }
        }
    }
}

fn seed_table<S: SqlStore>(writer: &mut S, table: &TableDef) -> Result<(), FixtureError> {
    let schema_err = |e: QueryError| FixtureError::SchemaCreation {
        table: table.name.clone(),
        detail: e.to_string(),
    };
    writer
        .execute(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(&table.name)
        ))
        .map_err(schema_err)?;
    writer
        .execute(&table.create_statement())
        .map_err(schema_err)?;

    if table.rows.is_empty() {
        debug!(table = %table.name, "created empty table");
        return Ok(());
    }
    let written = writer
        .insert_rows(&table.name, &table.column_names(), &table.rows)
        .map_err(|e| FixtureError::Seed {
            table: table.name.clone(),
            detail: e.to_string(),
        })?;
    debug!(table = %table.name, rows = written, "seeded table");
    Ok(())
}

/// Row count statement in the dialect `SqlStore::query` accepts.
fn count_query(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", dialect::quote_backticks(table))
}

fn verify_counts<S: SqlStore>(
    store: &mut S,
    expected: &BTreeMap<String, usize>,
    timeout: Duration,
) -> Result<(), FixtureError> {
    for (table, &want) in expected {
        let count_err = |detail: String| FixtureError::Seed {
            table: table.clone(),
            detail,
        };
        let rs = store
            .query(&count_query(table), timeout)
            .map_err(|e| count_err(e.to_string()))?;
        let actual = rs
            .first_row()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_number)
            .ok_or_else(|| count_err("COUNT(*) returned no number".to_owned()))?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let actual = actual as usize;
        if actual != want {
            return Err(FixtureError::CountMismatch {
                table: table.clone(),
                expected: want,
                actual,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A loaded fixture.
///
/// Holds the writer session for as long as the run lasts, which also keeps
/// in-memory databases alive. Cases get their own read-only sessions.
pub struct FixtureHandle<C: StoreConnector> {
    connector: C,
    writer: C::Store,
    name: String,
    fingerprint: String,
    seed_counts: BTreeMap<String, usize>,
}

impl<C: StoreConnector> std::fmt::Debug for FixtureHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureHandle")
            .field("name", &self.name)
            .field("store", &self.connector.describe())
            .field("fingerprint", &self.fingerprint)
            .field("seed_counts", &self.seed_counts)
            .finish_non_exhaustive()
    }
}

impl<C: StoreConnector> FixtureHandle<C> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub const fn seed_counts(&self) -> &BTreeMap<String, usize> {
        &self.seed_counts
    }

    #[must_use]
    pub fn seed_count(&self, table: &str) -> Option<usize> {
        self.seed_counts.get(table).copied()
    }

    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.writer.engine_name()
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// New read-only session against the fixture.
    pub fn open_session(&self) -> Result<C::Store, QueryError> {
        self.connector.connect(AccessMode::ReadOnly)
    }

    /// Re-run the `COUNT(*)` round trip against the seed counts.
    pub fn verify(&mut self, timeout: Duration) -> Result<(), FixtureError> {
        verify_counts(&mut self.writer, &self.seed_counts, timeout)
    }
}
