//! Run-twice determinism check.
//!
//! The fixture is reloaded before each run. Strict cases must come out with
//! the same status both times; informational cases are skipped because their
//! output depends on the engine's choice of representative rows.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sqldrill_error::FixtureError;

use crate::fixture::{FixtureDocument, FixtureLoader};
use crate::registry::CaseRegistry;
use crate::runner::{CaseStatus, RunOptions, RunOutcome, Runner};
use crate::store::StoreConnector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDivergence {
    pub case_id: String,
    pub first: CaseStatus,
    pub second: CaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismReport {
    /// Strict cases compared across the two runs.
    pub compared: usize,
    pub skipped_informational: usize,
    pub divergent: Vec<StatusDivergence>,
}

impl DeterminismReport {
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.divergent.is_empty()
    }
}

/// Compare per-case statuses of two runs over the same registry.
#[must_use]
pub fn compare_runs(registry: &CaseRegistry, first: &RunOutcome, second: &RunOutcome) -> DeterminismReport {
    let mut report = DeterminismReport::default();
    for case in registry {
        if case.is_informational() {
            report.skipped_informational += 1;
            continue;
        }
        let (Some(a), Some(b)) = (first.result(&case.id), second.result(&case.id)) else {
            continue;
        };
        report.compared += 1;
        if a.status != b.status {
            report.divergent.push(StatusDivergence {
                case_id: case.id.clone(),
                first: a.status,
                second: b.status,
            });
        }
    }
    report
}

/// Load, run, reload, run again, then compare.
pub fn check_determinism<C: StoreConnector + Clone>(
    loader: &FixtureLoader<C>,
    document: &FixtureDocument,
    registry: &CaseRegistry,
    options: &RunOptions,
) -> Result<DeterminismReport, FixtureError> {
    let runner = Runner::new(*options);
    let first = {
        let handle = loader.load(document)?;
        runner.run(registry, &handle)
    };
    let second = {
        let handle = loader.load(document)?;
        runner.run(registry, &handle)
    };

    let report = compare_runs(registry, &first, &second);
    if report.is_deterministic() {
        info!(compared = report.compared, "determinism check passed");
    } else {
        for d in &report.divergent {
            warn!(case_id = %d.case_id, first = %d.first, second = %d.second, "status diverged between runs");
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Case, CaseMode};
    use crate::runner::CaseResult;

    fn outcome(statuses: &[(&str, CaseStatus)]) -> RunOutcome {
        RunOutcome {
            results: statuses
                .iter()
                .map(|(id, status)| CaseResult {
                    case_id: (*id).to_owned(),
                    status: *status,
                    mode: CaseMode::Strict,
                    observed: String::new(),
                    diff: None,
                    elapsed_ms: 0,
                })
                .collect(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn divergence_is_reported_and_informational_skipped() {
        let mut registry = CaseRegistry::new();
        registry.register(Case::new("a", "q").expect_row_count(1)).unwrap();
        registry.register(Case::new("b", "q").expect_row_count(1)).unwrap();
        registry
            .register(Case::new("c", "q").informational().expect_completes())
            .unwrap();

        let first = outcome(&[("a", CaseStatus::Pass), ("b", CaseStatus::Pass), ("c", CaseStatus::Pass)]);
        let second = outcome(&[("a", CaseStatus::Pass), ("b", CaseStatus::Fail), ("c", CaseStatus::Fail)]);
        let report = compare_runs(&registry, &first, &second);
        assert_eq!(report.compared, 2);
        assert_eq!(report.skipped_informational, 1);
        assert_eq!(
            report.divergent,
            vec![StatusDivergence {
                case_id: "b".into(),
                first: CaseStatus::Pass,
                second: CaseStatus::Fail
            }]
        );
        assert!(!report.is_deterministic());
    }
}
