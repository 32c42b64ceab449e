use std::path::PathBuf;

use thiserror::Error;

/// Failure while building the seeded fixture.
///
/// Every variant is fatal: no case can run against a half-built fixture.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Fixture file could not be read.
    #[error("cannot read fixture '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture document is not valid JSON or does not match the format.
    #[error("malformed fixture document: {detail}")]
    Parse { detail: String },

    /// Fixture declares a format version this build does not understand.
    #[error("unsupported fixture format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Fixture declares no tables.
    #[error("fixture '{name}' declares no tables")]
    Empty { name: String },

    /// Two table definitions share a name.
    #[error("table {name} is declared more than once")]
    DuplicateTable { name: String },

    /// A table or column name is not a plain SQL identifier.
    #[error("invalid {what} name: {name:?}")]
    InvalidIdentifier { what: &'static str, name: String },

    /// A table declares the same column twice.
    #[error("table {table} declares column {column} more than once")]
    DuplicateColumn { table: String, column: String },

    /// A seed row does not have one value per column.
    #[error("table {table} row {row}: expected {expected} values, got {actual}")]
    RowArity {
        table: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The store could not be reached, even after the reconnect attempt.
    #[error("store unreachable: {detail}")]
    Unreachable { detail: String },

    /// DROP/CREATE for a table failed.
    #[error("schema creation failed for table {table}: {detail}")]
    SchemaCreation { table: String, detail: String },

    /// Inserting seed rows failed.
    #[error("seeding table {table} failed: {detail}")]
    Seed { table: String, detail: String },

    /// Post-load `SELECT COUNT(*)` disagrees with the seed data.
    #[error("table {table} holds {actual} rows after seeding, expected {expected}")]
    CountMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
}

/// Malformed case definition. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A case with this id is already registered.
    #[error("duplicate case id: {id}")]
    DuplicateId { id: String },

    /// Case id is empty or whitespace.
    #[error("case id must not be empty")]
    EmptyId,

    /// Case query is empty or whitespace.
    #[error("case {id} has an empty query")]
    EmptyQuery { id: String },

    /// Case carries no checkable expectation.
    #[error("case {id} has no expectation")]
    MissingExpectation { id: String },

    /// An expected-to-error case also carries result expectations.
    #[error("case {id}: a rejected expectation must be the only expectation")]
    RejectedNotExclusive { id: String },

    /// Informational cases may not assert literal values.
    #[error("case {id} is informational and cannot assert {kind}")]
    ValueCheckOnInformational { id: String, kind: &'static str },

    /// `Completes` only makes sense on informational cases.
    #[error("case {id} is strict and needs a literal expectation, not completes")]
    CompletesOnStrict { id: String },

    /// Expectation payload is unusable (empty column list, bad tolerance, ...).
    #[error("case {id}: invalid expectation: {detail}")]
    InvalidExpectation { id: String, detail: String },

    /// Case file could not be read or parsed.
    #[error("case file {path}: {detail}")]
    CaseFile { path: String, detail: String },
}

/// The store rejected or failed to execute a statement.
///
/// Recorded as a per-case `Error`; the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Statement failed inside the store (syntax error, missing table, ...).
    #[error("query rejected: {message}")]
    Rejected { message: String },

    /// Statement exceeded the caller-supplied timeout and was interrupted.
    #[error("query timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// No usable connection to the store.
    #[error("store connection failed: {detail}")]
    Connection { detail: String },
}

/// Invalid configuration file or command-line override. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("invalid config value {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}

/// Umbrella error for harness entry points.
#[derive(Error, Debug)]
pub enum DrillError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Create a rejection from any store error message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create a connection failure.
    pub fn connection(detail: impl Into<String>) -> Self {
        Self::Connection {
            detail: detail.into(),
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl DrillError {
    /// Whether this error aborts the whole run rather than a single case.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Query(_))
    }

    /// Process exit code for CLI use: 2 for fatal setup errors, 1 otherwise.
    pub const fn exit_code(&self) -> i32 {
        if self.is_fatal() { 2 } else { 1 }
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Fixture(FixtureError::Unreachable { .. }) => {
                Some("Check the [store] database setting and that the path is writable")
            }
            Self::Fixture(FixtureError::UnsupportedVersion { .. }) => {
                Some("Regenerate the fixture file with format_version = 1")
            }
            Self::Registration(RegistrationError::DuplicateId { .. }) => {
                Some("Rename one of the cases or drop the duplicate case file")
            }
            Self::Query(QueryError::Timeout { .. }) => Some("Raise --timeout-ms"),
            _ => None,
        }
    }
}

/// Result type alias using `DrillError`.
pub type Result<T> = std::result::Result<T, DrillError>;
