//! Aggregates case results into a summary and renders reports.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::case::CaseMode;
use crate::runner::{CaseResult, CaseStatus};

/// Report schema version for JSON output.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub total: usize,
}

impl Summary {
    /// True when nothing failed or errored.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Count statuses. Pure.
#[must_use]
pub fn summarize(results: &[CaseResult]) -> Summary {
    let mut summary = Summary {
        total: results.len(),
        ..Summary::default()
    };
    for result in results {
        match result.status {
            CaseStatus::Pass => summary.passed += 1,
            CaseStatus::Fail => summary.failed += 1,
            CaseStatus::Error => summary.errored += 1,
        }
    }
    summary
}

/// Where the results came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContext {
    pub fixture: String,
    pub fingerprint: String,
    pub engine: String,
}

/// JSON report document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    #[serde(flatten)]
    pub context: ReportContext,
    pub summary: Summary,
    pub results: Vec<CaseResult>,
}

/// Plain-text table: one line per case, then any diffs, then a totals line.
#[must_use]
pub fn render_text(context: &ReportContext, results: &[CaseResult]) -> String {
    let summary = summarize(results);
    let id_width = results
        .iter()
        .map(|r| r.case_id.len())
        .max()
        .unwrap_or(0)
        .max("CASE".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "fixture {} ({}) on {}",
        context.fixture,
        short_fingerprint(&context.fingerprint),
        context.engine
    );
    let _ = writeln!(out, "{:<6} {:<id_width$} {:>8}  OBSERVED", "STATUS", "CASE", "MS");
    for result in results {
        let marker = if result.mode == CaseMode::Informational {
            " (informational)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<6} {:<id_width$} {:>8}  {}{marker}",
            result.status.to_string(),
            result.case_id,
            result.elapsed_ms,
            result.observed
        );
    }

    let diffs: Vec<_> = results
        .iter()
        .filter_map(|r| r.diff.as_ref().map(|d| (&r.case_id, d)))
        .collect();
    if !diffs.is_empty() {
        out.push('\n');
        for (case_id, diff) in diffs {
            let _ = writeln!(out, "{case_id}: {diff}");
        }
    }

    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} errored, {} total",
        summary.passed, summary.failed, summary.errored, summary.total
    );
    out
}

/// JSON document with context, summary and per-case results.
pub fn render_json(context: &ReportContext, results: &[CaseResult]) -> serde_json::Result<String> {
    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        context: context.clone(),
        summary: summarize(results),
        results: results.to_vec(),
    };
    serde_json::to_string_pretty(&report)
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
