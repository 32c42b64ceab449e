//! Executes cases against a loaded fixture and grades the results.
//!
//! # Outcomes
//!
//! - `Pass`: every expectation holds
//! - `Fail`: the query ran but an expectation does not hold
//! - `Error`: the query could not run (store error, timeout, no session)
//!
//! A `Rejected` expectation inverts the first two: a store refusal is a pass
//! and a successful run is a failure. A timeout is an error either way.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use sqldrill_error::QueryError;

use crate::case::{Case, CaseMode, Expectation};
use crate::fixture::FixtureHandle;
use crate::registry::CaseRegistry;
use crate::report::{Summary, summarize};
use crate::store::{AccessMode, SqlStore, StoreConnector};
use crate::value::{ResultSet, SqlValue};

/// Default per-query timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        })
    }
}

/// Outcome of one case in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub status: CaseStatus,
    pub mode: CaseMode,
    /// Result summary, or the store's error message.
    pub observed: String,
    /// What did not match. Present on `Fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    pub elapsed_ms: u64,
}

impl CaseResult {
    fn errored(case: &Case, observed: String, elapsed_ms: u64) -> Self {
        Self {
            case_id: case.id.clone(),
            status: CaseStatus::Error,
            mode: case.mode,
            observed,
            diff: None,
            elapsed_ms,
        }
    }
}

/// An expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionMismatch {
    pub kind: &'static str,
    pub detail: String,
}

impl fmt::Display for AssertionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Check one expectation against a result set.
pub fn evaluate(expectation: &Expectation, rs: &ResultSet) -> Result<(), AssertionMismatch> {
    let mismatch = |detail: String| AssertionMismatch {
        kind: expectation.kind_name(),
        detail,
    };
    match expectation {
        Expectation::RowCount { count } => {
            if rs.row_count() == *count {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "expected {count} rows, got {}",
                    rs.row_count()
                )))
            }
        }
        Expectation::FirstRowEquals { values } => {
            let first = rs
                .first_row()
                .ok_or_else(|| mismatch("query returned no rows".to_owned()))?;
            let mut problems = Vec::new();
            for (column, want) in values {
                let idx = column_position(rs, column).map_err(&mismatch)?;
                let got = &first[idx];
                if !want.matches(got) {
                    problems.push(format!("{column}: expected {want}, got {got}"));
                }
            }
            if problems.is_empty() {
                Ok(())
            } else {
                Err(mismatch(problems.join(", ")))
            }
        }
        Expectation::OrderedColumnValues { column, values } => {
            let idx = column_position(rs, column).map_err(&mismatch)?;
            if rs.row_count() < values.len() {
                return Err(mismatch(format!(
                    "expected at least {} rows for column {column}, got {}",
                    values.len(),
                    rs.row_count()
                )));
            }
            for (pos, (want, row)) in values.iter().zip(&rs.rows).enumerate() {
                let got = &row[idx];
                if !want.matches(got) {
                    return Err(mismatch(format!(
                        "{column} row {}: expected {want}, got {got}",
                        pos + 1
                    )));
                }
            }
            Ok(())
        }
        Expectation::ContainsRow { values } => {
            let mut wanted = Vec::with_capacity(values.len());
            for (column, want) in values {
                wanted.push((column_position(rs, column).map_err(&mismatch)?, want));
            }
            let found = rs
                .rows
                .iter()
                .any(|row| wanted.iter().all(|(idx, want)| want.matches(&row[*idx])));
            if found {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "no row with {} among {} rows",
                    describe_pairs(values),
                    rs.row_count()
                )))
            }
        }
        Expectation::FirstRowApprox {
            column,
            value,
            tolerance,
        } => {
            let first = rs
                .first_row()
                .ok_or_else(|| mismatch("query returned no rows".to_owned()))?;
            let idx = column_position(rs, column).map_err(&mismatch)?;
            let got = &first[idx];
            let Some(number) = got.as_number() else {
                return Err(mismatch(format!("{column}: expected a number, got {got}")));
            };
            if (number - value).abs() <= *tolerance {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "{column}: expected {value} ± {tolerance}, got {number}"
                )))
            }
        }
        Expectation::Completes => Ok(()),
        Expectation::Rejected => Err(mismatch(format!(
            "expected the store to reject the query, it returned {} rows",
            rs.row_count()
        ))),
    }
}

fn column_position(rs: &ResultSet, column: &str) -> Result<usize, String> {
    rs.column_index(column).ok_or_else(|| {
        format!(
            "column {column} not in result (columns: {})",
            rs.columns.join(", ")
        )
    })
}

fn describe_pairs(values: &[(String, SqlValue)]) -> String {
    values
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn millis_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run one case on an open session and grade it.
pub fn run_case<S: SqlStore>(case: &Case, session: &mut S, timeout: Duration) -> CaseResult {
    let started = Instant::now();
    debug!(case_id = %case.id, "running case");
    let outcome = session.query(&case.query, timeout);
    let elapsed_ms = millis_since(started);

    let (status, observed, diff) = match outcome {
        Err(err @ QueryError::Timeout { .. }) => (CaseStatus::Error, err.to_string(), None),
        Err(QueryError::Rejected { message }) if case.expects_rejection() => {
            (CaseStatus::Pass, format!("rejected: {message}"), None)
        }
        Err(err) => (CaseStatus::Error, err.to_string(), None),
        Ok(rs) => {
            let problems: Vec<String> = case
                .expectations
                .iter()
                .filter_map(|e| evaluate(e, &rs).err())
                .map(|m| m.to_string())
                .collect();
            if problems.is_empty() {
                (CaseStatus::Pass, rs.summary(), None)
            } else {
                (CaseStatus::Fail, rs.summary(), Some(problems.join("; ")))
            }
        }
    };

    match status {
        CaseStatus::Pass => debug!(case_id = %case.id, elapsed_ms, "case passed"),
        CaseStatus::Fail => warn!(
            case_id = %case.id,
            elapsed_ms,
            diff = diff.as_deref().unwrap_or_default(),
            "case failed"
        ),
        CaseStatus::Error => warn!(case_id = %case.id, elapsed_ms, error = %observed, "case errored"),
    }

    CaseResult {
        case_id: case.id.clone(),
        status,
        mode: case.mode,
        observed,
        diff,
        elapsed_ms,
    }
}

/// Run a case inside a read transaction, converting a panic into an error
/// result.
fn run_isolated<S: SqlStore>(case: &Case, session: &mut S, timeout: Duration) -> CaseResult {
    let started = Instant::now();
    if let Err(err) = session.begin_read() {
        return CaseResult::errored(case, format!("cannot open read transaction: {err}"), 0);
    }
    let result = catch_unwind(AssertUnwindSafe(|| run_case(case, session, timeout)));
    if let Err(err) = session.end_read() {
        // An interrupted statement can end the transaction on its own.
        debug!(case_id = %case.id, error = %err, "read transaction already closed");
    }
    result.unwrap_or_else(|_| {
        error!(case_id = %case.id, "case panicked");
        CaseResult::errored(case, "case panicked".to_owned(), millis_since(started))
    })
}

/// Timeout and parallelism for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub timeout: Duration,
    /// Worker threads. 1 runs sequentially.
    pub parallelism: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            parallelism: 1,
        }
    }
}

/// Results of a full run, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub results: Vec<CaseResult>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    #[must_use]
    pub fn summary(&self) -> Summary {
        summarize(&self.results)
    }

    #[must_use]
    pub fn result(&self, case_id: &str) -> Option<&CaseResult> {
        self.results.iter().find(|r| r.case_id == case_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Runner {
    options: RunOptions,
}

impl Runner {
    #[must_use]
    pub const fn new(options: RunOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every registered case against the fixture.
    pub fn run<C: StoreConnector>(
        &self,
        registry: &CaseRegistry,
        handle: &FixtureHandle<C>,
    ) -> RunOutcome {
        self.run_with(registry, handle.connector())
    }

    /// Run every registered case on sessions opened from `connector`.
    pub fn run_with<C: StoreConnector>(&self, registry: &CaseRegistry, connector: &C) -> RunOutcome {
        let started = Instant::now();
        let indexed: Vec<(usize, &Case)> = registry.iter().enumerate().collect();
        let workers = self.options.parallelism.clamp(1, indexed.len().max(1));
        info!(
            cases = indexed.len(),
            workers,
            timeout_ms = u64::try_from(self.options.timeout.as_millis()).unwrap_or(u64::MAX),
            "starting run"
        );

        let results = if workers == 1 {
            run_batch(connector, &indexed, self.options.timeout)
                .into_iter()
                .map(|(_, r)| r)
                .collect()
        } else {
            self.run_parallel(connector, &indexed, workers)
        };

        let outcome = RunOutcome {
            results,
            elapsed_ms: millis_since(started),
        };
        let summary = outcome.summary();
        info!(
            passed = summary.passed,
            failed = summary.failed,
            errored = summary.errored,
            elapsed_ms = outcome.elapsed_ms,
            "run finished"
        );
        outcome
    }

    fn run_parallel<C: StoreConnector>(
        &self,
        connector: &C,
        indexed: &[(usize, &Case)],
        workers: usize,
    ) -> Vec<CaseResult> {
        let mut batches: Vec<Vec<(usize, &Case)>> = vec![Vec::new(); workers];
        for (pos, entry) in indexed.iter().enumerate() {
            batches[pos % workers].push(*entry);
        }
        let timeout = self.options.timeout;
        let mut slots: Vec<Option<CaseResult>> = vec![None; indexed.len()];

        std::thread::scope(|scope| {
            let spawned: Vec<_> = batches
                .iter()
                .map(|batch| (batch, scope.spawn(move || run_batch(connector, batch, timeout))))
                .collect();
            for (batch, worker) in spawned {
                match worker.join() {
                    Ok(results) => {
                        for (idx, result) in results {
                            slots[idx] = Some(result);
                        }
                    }
                    Err(_) => {
                        error!(cases = batch.len(), "runner worker panicked");
                        for &(idx, case) in batch {
                            slots[idx] = Some(CaseResult::errored(
                                case,
                                "runner worker panicked".to_owned(),
                                0,
                            ));
                        }
                    }
                }
            }
        });

        slots.into_iter().flatten().collect()
    }
}

/// Run a batch of cases on one read-only session.
fn run_batch<C: StoreConnector>(
    connector: &C,
    batch: &[(usize, &Case)],
    timeout: Duration,
) -> Vec<(usize, CaseResult)> {
    match connector.connect(AccessMode::ReadOnly) {
        Ok(mut session) => batch
            .iter()
            .map(|&(idx, case)| (idx, run_isolated(case, &mut session, timeout)))
            .collect(),
        Err(err) => {
            error!(error = %err, "cannot open read-only session");
            batch
                .iter()
                .map(|&(idx, case)| (idx, CaseResult::errored(case, err.to_string(), 0)))
                .collect()
        }
    }
}
