//! Exercise cases: a literal query plus what its result must look like.

use serde::{Deserialize, Serialize};

use sqldrill_error::RegistrationError;

use crate::value::SqlValue;

/// How strictly a case is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Literal expectations, part of the determinism check.
    #[default]
    Strict,
    /// Output depends on which representative row the engine picks for an
    /// unaggregated GROUP BY column. Only shape is checked, and the case is
    /// left out of the determinism check.
    Informational,
}

/// A single check against a query result.
///
/// Serialized with a `"kind"` tag, e.g. `{"kind": "row_count", "count": 8}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    /// Exact number of rows.
    RowCount { count: usize },
    /// Named columns of the first row, in the listed order.
    FirstRowEquals { values: Vec<(String, SqlValue)> },
    /// First `values.len()` values of one column, positionally.
    OrderedColumnValues { column: String, values: Vec<SqlValue> },
    /// Some row matches every listed column.
    ContainsRow { values: Vec<(String, SqlValue)> },
    /// First-row numeric value within an absolute tolerance.
    FirstRowApprox {
        column: String,
        value: f64,
        tolerance: f64,
    },
    /// The query runs without error.
    Completes,
    /// The store refuses the query.
    Rejected,
}

impl Expectation {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::RowCount { .. } => "row_count",
            Self::FirstRowEquals { .. } => "first_row_equals",
            Self::OrderedColumnValues { .. } => "ordered_column_values",
            Self::ContainsRow { .. } => "contains_row",
            Self::FirstRowApprox { .. } => "first_row_approx",
            Self::Completes => "completes",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this expectation asserts literal values (not just shape).
    #[must_use]
    pub const fn is_value_check(&self) -> bool {
        matches!(
            self,
            Self::FirstRowEquals { .. }
                | Self::OrderedColumnValues { .. }
                | Self::ContainsRow { .. }
                | Self::FirstRowApprox { .. }
        )
    }

    fn payload_problem(&self) -> Option<String> {
        match self {
            Self::FirstRowEquals { values } | Self::ContainsRow { values } => {
                if values.is_empty() {
                    Some(format!("{} needs at least one column", self.kind_name()))
                } else {
                    values
                        .iter()
                        .find(|(column, _)| column.trim().is_empty())
                        .map(|_| "column name must not be empty".to_owned())
                }
            }
            Self::OrderedColumnValues { column, values } => {
                if column.trim().is_empty() {
                    Some("column name must not be empty".to_owned())
                } else if values.is_empty() {
                    Some("ordered_column_values needs at least one value".to_owned())
                } else {
                    None
                }
            }
            Self::FirstRowApprox {
                column,
                value,
                tolerance,
            } => {
                if column.trim().is_empty() {
                    Some("column name must not be empty".to_owned())
                } else if !value.is_finite() || !tolerance.is_finite() || *tolerance < 0.0 {
                    Some("approximate value and tolerance must be finite, tolerance >= 0".to_owned())
                } else {
                    None
                }
            }
            Self::RowCount { .. } | Self::Completes | Self::Rejected => None,
        }
    }
}

fn pairs(values: &[(&str, SqlValue)]) -> Vec<(String, SqlValue)> {
    values
        .iter()
        .map(|(column, value)| ((*column).to_owned(), value.clone()))
        .collect()
}

/// One exercise case. Built with the chained constructors below, checked and
/// frozen by [`crate::registry::CaseRegistry::register`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub query: String,
    #[serde(default)]
    pub mode: CaseMode,
    pub expectations: Vec<Expectation>,
}

impl Case {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            query: query.into(),
            mode: CaseMode::Strict,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn informational(mut self) -> Self {
        self.mode = CaseMode::Informational;
        self
    }

    #[must_use]
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    #[must_use]
    pub fn expect_row_count(self, count: usize) -> Self {
        self.expect(Expectation::RowCount { count })
    }

    #[must_use]
    pub fn expect_first_row(self, values: &[(&str, SqlValue)]) -> Self {
        self.expect(Expectation::FirstRowEquals {
            values: pairs(values),
        })
    }

    #[must_use]
    pub fn expect_column(self, column: &str, values: Vec<SqlValue>) -> Self {
        self.expect(Expectation::OrderedColumnValues {
            column: column.to_owned(),
            values,
        })
    }

    #[must_use]
    pub fn expect_contains_row(self, values: &[(&str, SqlValue)]) -> Self {
        self.expect(Expectation::ContainsRow {
            values: pairs(values),
        })
    }

    #[must_use]
    pub fn expect_approx(self, column: &str, value: f64, tolerance: f64) -> Self {
        self.expect(Expectation::FirstRowApprox {
            column: column.to_owned(),
            value,
            tolerance,
        })
    }

    #[must_use]
    pub fn expect_completes(self) -> Self {
        self.expect(Expectation::Completes)
    }

    #[must_use]
    pub fn expect_rejected(self) -> Self {
        self.expect(Expectation::Rejected)
    }

    #[must_use]
    pub const fn is_informational(&self) -> bool {
        matches!(self.mode, CaseMode::Informational)
    }

    /// Whether the case passes only when the store refuses the query.
    #[must_use]
    pub fn expects_rejection(&self) -> bool {
        self.expectations
            .iter()
            .any(|e| matches!(e, Expectation::Rejected))
    }

    /// Registration rules for a single case.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.id.trim().is_empty() {
            return Err(RegistrationError::EmptyId);
        }
        let id = || self.id.clone();
        if self.query.trim().is_empty() {
            return Err(RegistrationError::EmptyQuery { id: id() });
        }
        if self.expectations.is_empty() {
            return Err(RegistrationError::MissingExpectation { id: id() });
        }
        if self.expects_rejection() && self.expectations.len() > 1 {
            return Err(RegistrationError::RejectedNotExclusive { id: id() });
        }
        for expectation in &self.expectations {
            match (self.mode, expectation) {
                (CaseMode::Informational, e) if e.is_value_check() => {
                    return Err(RegistrationError::ValueCheckOnInformational {
                        id: id(),
                        kind: e.kind_name(),
                    });
                }
                (CaseMode::Strict, Expectation::Completes) => {
                    return Err(RegistrationError::CompletesOnStrict { id: id() });
                }
                _ => {}
            }
            if let Some(detail) = expectation.payload_problem() {
                return Err(RegistrationError::InvalidExpectation { id: id(), detail });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_expectations() {
        let case = Case::new("ex05-q1", "SELECT 1")
            .titled("dogs per gender and breed group")
            .expect_row_count(17)
            .expect_first_row(&[("Num_Dogs", 8466.into())]);
        assert_eq!(case.mode, CaseMode::Strict);
        assert_eq!(case.expectations.len(), 2);
        assert_eq!(case.expectations[1].kind_name(), "first_row_equals");
        case.validate().unwrap();
    }

    #[test]
    fn validation_rules() {
        let base = || Case::new("x", "SELECT 1");
        assert_eq!(
            Case::new(" ", "SELECT 1").expect_row_count(1).validate(),
            Err(RegistrationError::EmptyId)
        );
        assert!(matches!(
            Case::new("x", "  ").expect_row_count(1).validate(),
            Err(RegistrationError::EmptyQuery { .. })
        ));
        assert!(matches!(
            base().validate(),
            Err(RegistrationError::MissingExpectation { .. })
        ));
        assert!(matches!(
            base().expect_rejected().expect_row_count(0).validate(),
            Err(RegistrationError::RejectedNotExclusive { .. })
        ));
        assert!(matches!(
            base().informational().expect_first_row(&[("a", 1.into())]).validate(),
            Err(RegistrationError::ValueCheckOnInformational { kind: "first_row_equals", .. })
        ));
        assert!(matches!(
            base().expect_completes().validate(),
            Err(RegistrationError::CompletesOnStrict { .. })
        ));
        assert!(matches!(
            base().expect_column("numrows", Vec::new()).validate(),
            Err(RegistrationError::InvalidExpectation { .. })
        ));
        assert!(matches!(
            base().expect_approx("AvgDuration", 9934.0, -1.0).validate(),
            Err(RegistrationError::InvalidExpectation { .. })
        ));
        base().informational().expect_row_count(4).expect_completes().validate().unwrap();
        base().expect_rejected().validate().unwrap();
    }

    #[test]
    fn case_json_shape() {
        let case = Case::new("ex09-q1", "SELECT AVG(x) AS AvgDuration FROM t")
            .expect_approx("AvgDuration", 9934.0, 1.0)
            .expect_column("numrows", vec![913_138.into(), 442.into()]);
        let json = serde_json::to_value(&case).unwrap();
        assert_eq!(json["mode"], "strict");
        assert_eq!(json["expectations"][0]["kind"], "first_row_approx");
        assert_eq!(json["expectations"][1]["values"][1], 442);
        assert!(json.get("title").is_none());

        let back: Case = serde_json::from_value(json).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn case_json_defaults() {
        let case: Case = serde_json::from_str(
            r#"{"id": "c", "query": "SELECT 1",
                "expectations": [{"kind": "completes"}, {"kind": "row_count", "count": 1}],
                "mode": "informational"}"#,
        )
        .unwrap();
        assert!(case.is_informational());
        assert_eq!(case.expectations[0], Expectation::Completes);
        assert_eq!(case.title, "");
        case.validate().unwrap();
    }
}
