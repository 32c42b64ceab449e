//! SQL literals and result sets.
//!
//! # Comparison rules
//!
//! - NULL equals NULL and nothing else
//! - numbers compare numerically with a 1e-9 relative tolerance, whether they
//!   arrive as integers, reals or numeric text
//! - other text compares exactly after trimming surrounding whitespace
//! - column names match case-insensitively with inner whitespace collapsed

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Relative tolerance for numeric comparison.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// How many values of the first row go into a result summary.
const SUMMARY_VALUE_LIMIT: usize = 6;

/// A single SQL value as seeded into, or read back from, the store.
///
/// Serialized as the bare JSON literal (`null`, `3`, `2.5`, `"text"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Text counts when it parses as a finite number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => r.is_finite().then_some(*r),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }

    /// Whether an observed value satisfies this expected value.
    ///
    /// Two text values always compare as text, so `"02134"` and `"2134"`
    /// differ. Numeric comparison needs an `Integer` or `Real` on one side.
    #[must_use]
    pub fn matches(&self, observed: &Self) -> bool {
        match (self, observed) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a.trim() == b.trim(),
            _ => match (self.as_number(), observed.as_number()) {
                (Some(a), Some(b)) => floats_match(a, b),
                _ => self.text_form() == observed.text_form(),
            },
        }
    }

    fn text_form(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
            Self::Text(s) => s.trim().to_owned(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Compare two floats within [`FLOAT_TOLERANCE`].
#[must_use]
pub fn floats_match(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    // Scale clamps at 1.0 so values near zero still compare.
    let scale = a.abs().max(b.abs()).max(1.0);
    (diff / scale) < FLOAT_TOLERANCE
}

/// Canonical form of a column name for lookups.
#[must_use]
pub fn normalize_column_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Full result of one query: column labels plus every row, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn first_row(&self) -> Option<&[SqlValue]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Position of `name` among the result columns, or `None`.
    ///
    /// The first matching column wins when a query repeats a label.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_column_name(name);
        self.columns
            .iter()
            .position(|c| normalize_column_name(c) == wanted)
    }

    /// Value at `row`, `column` if both exist.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// One-line description: row count plus a preview of the first row.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = match self.rows.len() {
            1 => "1 row".to_owned(),
            n => format!("{n} rows"),
        };
        if let Some(first) = self.first_row() {
            out.push_str("; first row: (");
            for (i, (column, value)) in self.columns.iter().zip(first).enumerate() {
                if i == SUMMARY_VALUE_LIMIT {
                    out.push_str(", ...");
                    break;
                }
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}={value}", normalize_column_name(column));
            }
            out.push(')');
        }
        out
    }
}
