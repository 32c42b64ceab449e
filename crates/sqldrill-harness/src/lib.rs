//! Verification harness for the Dognition SQL practice exercises.
//!
//! A run loads a fixture into a store, registers cases (the built-in
//! [`catalog`] plus any case files), executes every case in its own
//! read-only session and reports PASS / FAIL / ERROR per case.
//!
//! The store sits behind [`store::SqlStore`]; [`sqlite`] is the bundled
//! backend and [`dialect`] lets it accept the MySQL spellings the exercises
//! use.

pub mod case;
pub mod catalog;
pub mod config;
pub mod determinism;
pub mod dialect;
pub mod fixture;
pub mod registry;
pub mod report;
pub mod runner;
pub mod sqlite;
pub mod store;
pub mod value;

pub use case::{Case, CaseMode, Expectation};
pub use catalog::{DOGNITION_TABLES, dognition_cases, dognition_registry};
pub use config::DrillConfig;
pub use determinism::{DeterminismReport, check_determinism};
pub use fixture::{FixtureDocument, FixtureHandle, FixtureLoader};
pub use registry::CaseRegistry;
pub use report::{ReportContext, Summary, render_json, render_text, summarize};
pub use runner::{CaseResult, CaseStatus, RunOptions, RunOutcome, Runner};
pub use sqlite::{SqliteConnector, SqliteStore};
pub use store::{AccessMode, SqlStore, StoreConnector};
pub use value::{ResultSet, SqlValue};
