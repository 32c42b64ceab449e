//! Ordered, id-unique collection of cases.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sqldrill_error::RegistrationError;

use crate::case::Case;

/// Case file format understood by this build.
pub const CASE_FILE_FORMAT_VERSION: u32 = 1;

/// On-disk case file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub format_version: u32,
    pub cases: Vec<Case>,
}

/// Cases in registration order. Once registered a case cannot change.
#[derive(Debug, Clone, Default)]
pub struct CaseRegistry {
    cases: Vec<Case>,
    by_id: HashMap<String, usize>,
}

impl CaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `case` and append it.
    pub fn register(&mut self, case: Case) -> Result<(), RegistrationError> {
        case.validate()?;
        if self.by_id.contains_key(&case.id) {
            return Err(RegistrationError::DuplicateId { id: case.id });
        }
        debug!(case_id = %case.id, expectations = case.expectations.len(), "registered case");
        self.by_id.insert(case.id.clone(), self.cases.len());
        self.cases.push(case);
        Ok(())
    }

    /// Register every case, stopping at the first rejection.
    pub fn register_all(
        &mut self,
        cases: impl IntoIterator<Item = Case>,
    ) -> Result<(), RegistrationError> {
        for case in cases {
            self.register(case)?;
        }
        Ok(())
    }

    /// All cases in registration order.
    #[must_use]
    pub fn all(&self) -> &[Case] {
        &self.cases
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Case> {
        self.cases.iter()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Case> {
        self.by_id.get(id).map(|&idx| &self.cases[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Cases whose id contains `pattern`, order preserved.
    #[must_use]
    pub fn filtered(&self, pattern: &str) -> Self {
        let mut out = Self::new();
        for case in self.cases.iter().filter(|c| c.id.contains(pattern)) {
            out.by_id.insert(case.id.clone(), out.cases.len());
            out.cases.push(case.clone());
        }
        out
    }

    /// Append every case of `other`, still enforcing id uniqueness.
    pub fn extend_from(&mut self, other: &Self) -> Result<(), RegistrationError> {
        self.register_all(other.cases.iter().cloned())
    }

    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, RegistrationError> {
        let file: CaseFile = serde_json::from_str(raw).map_err(|e| RegistrationError::CaseFile {
            path: origin.to_owned(),
            detail: e.to_string(),
        })?;
        if file.format_version != CASE_FILE_FORMAT_VERSION {
            return Err(RegistrationError::CaseFile {
                path: origin.to_owned(),
                detail: format!(
                    "unsupported format version {} (supported: {CASE_FILE_FORMAT_VERSION})",
                    file.format_version
                ),
            });
        }
        let mut registry = Self::new();
        registry.register_all(file.cases)?;
        Ok(registry)
    }

    pub fn from_case_file(path: &Path) -> Result<Self, RegistrationError> {
        let origin = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| RegistrationError::CaseFile {
            path: origin.clone(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&raw, &origin)
    }

    #[must_use]
    pub fn to_case_file(&self) -> CaseFile {
        CaseFile {
            format_version: CASE_FILE_FORMAT_VERSION,
            cases: self.cases.clone(),
        }
    }
}

impl<'a> IntoIterator for &'a CaseRegistry {
    type Item = &'a Case;
    type IntoIter = std::slice::Iter<'a, Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str) -> Case {
        Case::new(id, "SELECT 1").expect_row_count(1)
    }

    #[test]
    fn keeps_registration_order() {
        let mut reg = CaseRegistry::new();
        for id in ["ex05-q3", "ex05-q1", "ex08-q7"] {
            reg.register(case(id)).unwrap();
        }
        let ids: Vec<_> = reg.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["ex05-q3", "ex05-q1", "ex08-q7"]);
        // Restartable.
        assert_eq!(reg.iter().count(), 3);
        assert_eq!((&reg).into_iter().count(), 3);
        assert_eq!(reg.get("ex05-q1").unwrap().id, "ex05-q1");
        assert!(reg.get("ex99").is_none());
    }

    #[test]
    fn rejects_duplicates_and_invalid_cases() {
        let mut reg = CaseRegistry::new();
        reg.register(case("a")).unwrap();
        assert_eq!(
            reg.register(case("a")),
            Err(RegistrationError::DuplicateId { id: "a".into() })
        );
        assert!(reg.register(Case::new("b", "SELECT 1")).is_err());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn filter_and_extend() {
        let mut reg = CaseRegistry::new();
        reg.register_all(["ex05-q1", "ex05-q2", "ex08-q1"].map(case)).unwrap();
        let ex05 = reg.filtered("ex05");
        assert_eq!(ex05.len(), 2);
        assert!(ex05.get("ex05-q2").is_some());
        assert!(reg.filtered("nope").is_empty());

        let mut other = CaseRegistry::new();
        other.register(case("extra")).unwrap();
        reg.extend_from(&other).unwrap();
        assert_eq!(reg.all().last().unwrap().id, "extra");
        assert!(matches!(
            reg.extend_from(&other),
            Err(RegistrationError::DuplicateId { .. })
        ));
    }

    #[test]
    fn case_file_round_trip() {
        let mut reg = CaseRegistry::new();
        reg.register(case("a").titled("first")).unwrap();
        let raw = serde_json::to_string_pretty(&reg.to_case_file()).unwrap();
        let back = CaseRegistry::from_json_str(&raw, "inline").unwrap();
        assert_eq!(back.all(), reg.all());
    }

    #[test]
    fn case_file_errors() {
        let err = CaseRegistry::from_json_str("{", "broken.json").unwrap_err();
        assert!(matches!(err, RegistrationError::CaseFile { ref path, .. } if path == "broken.json"));

        let err = CaseRegistry::from_json_str(r#"{"format_version": 7, "cases": []}"#, "v7")
            .unwrap_err();
        assert!(err.to_string().contains("unsupported format version 7"));

        let dup = r#"{"format_version": 1, "cases": [
            {"id": "a", "query": "SELECT 1", "expectations": [{"kind": "row_count", "count": 1}]},
            {"id": "a", "query": "SELECT 2", "expectations": [{"kind": "row_count", "count": 1}]}
        ]}"#;
        assert!(matches!(
            CaseRegistry::from_json_str(dup, "dup"),
            Err(RegistrationError::DuplicateId { .. })
        ));

        let err = CaseRegistry::from_case_file(Path::new("/nonexistent/cases.json")).unwrap_err();
        assert!(matches!(err, RegistrationError::CaseFile { .. }));
    }
}
