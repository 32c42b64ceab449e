//! `sqldrill.toml` configuration.
//!
//! ```toml
//! [store]
//! database = ":memory:"
//! timeout_ms = 30000
//! pragmas = ["cache_size = -8000"]
//!
//! [fixture]
//! path = "fixtures/sample_dognition.json"
//!
//! [run]
//! parallelism = 1
//! catalog = true
//! case_files = ["cases/extra.json"]
//! filter = "ex08"
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use sqldrill_error::ConfigError;

use crate::runner::{DEFAULT_TIMEOUT, RunOptions};
use crate::sqlite::{DatabaseTarget, SqliteConfig};

/// Default config file name looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "sqldrill.toml";

/// Upper bound for `run.parallelism`.
pub const MAX_PARALLELISM: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    fixture: FixtureSection,
    #[serde(default)]
    run: RunSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    database: Option<String>,
    timeout_ms: Option<u64>,
    #[serde(default)]
    pragmas: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixtureSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    parallelism: Option<usize>,
    catalog: Option<bool>,
    #[serde(default)]
    case_files: Vec<PathBuf>,
    filter: Option<String>,
}

/// Resolved settings. Command-line flags are applied on top of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillConfig {
    /// `":memory:"` or a database file path.
    pub database: String,
    pub timeout: Duration,
    pub pragmas: Vec<String>,
    pub fixture_path: Option<PathBuf>,
    pub parallelism: usize,
    /// Include the built-in exercise catalog.
    pub catalog: bool,
    pub case_files: Vec<PathBuf>,
    pub filter: Option<String>,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            pragmas: Vec::new(),
            fixture_path: None,
            parallelism: 1,
            catalog: true,
            case_files: Vec::new(),
            filter: None,
        }
    }
}

impl DrillConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&raw, path, base)
    }

    /// Parse TOML text. `origin` is used in error messages and `base` anchors
    /// relative paths.
    pub fn from_toml_str(raw: &str, origin: &Path, base: &Path) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;
        let defaults = Self::default();
        let config = Self {
            database: match doc.store.database {
                Some(db) if db != ":memory:" && !db.trim().is_empty() => {
                    resolve(base, Path::new(&db)).display().to_string()
                }
                Some(db) => db,
                None => defaults.database,
            },
            timeout: doc
                .store
                .timeout_ms
                .map_or(defaults.timeout, Duration::from_millis),
            pragmas: doc.store.pragmas,
            fixture_path: doc.fixture.path.map(|p| resolve(base, &p)),
            parallelism: doc.run.parallelism.unwrap_or(defaults.parallelism),
            catalog: doc.run.catalog.unwrap_or(defaults.catalog),
            case_files: doc.run.case_files.iter().map(|p| resolve(base, p)).collect(),
            filter: doc.run.filter,
        };
        config.validate()?;
        Ok(config)
    }

    /// Range checks, run again after command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store.database",
                detail: "must not be empty".to_owned(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "store.timeout_ms",
                detail: "must be positive".to_owned(),
            });
        }
        if !(1..=MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(ConfigError::Invalid {
                field: "run.parallelism",
                detail: format!("must be between 1 and {MAX_PARALLELISM}, got {}", self.parallelism),
            });
        }
        if let Some(bad) = self
            .pragmas
            .iter()
            .find(|p| p.trim().is_empty() || p.contains(';'))
        {
            return Err(ConfigError::Invalid {
                field: "store.pragmas",
                detail: format!("not a single pragma: {bad:?}"),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            timeout: self.timeout,
            parallelism: self.parallelism,
        }
    }

    #[must_use]
    pub fn sqlite_config(&self) -> SqliteConfig {
        SqliteConfig {
            target: DatabaseTarget::parse(&self.database),
            pragmas: self.pragmas.clone(),
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
