//! The exercise catalog against the sample schema.
//!
//! The sample data is far smaller than the real dataset, so literal
//! expectations mostly fail here. What must hold is that every notebook
//! query, MySQL spellings included, is accepted by the SQLite backend.

use std::path::Path;

use sqldrill_harness::{
    CaseStatus, DOGNITION_TABLES, FixtureDocument, FixtureLoader, Runner, SqliteConnector,
    dognition_registry,
};

fn load_sample() -> sqldrill_harness::FixtureHandle<SqliteConnector> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample_dognition.json");
    let document = FixtureDocument::from_path(&path).expect("sample fixture should parse");
    FixtureLoader::new(SqliteConnector::in_memory())
        .load(&document)
        .expect("sample fixture should load")
}

#[test]
fn test_sample_fixture_declares_every_catalog_table() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample_dognition.json");
    let document = FixtureDocument::from_path(&path).expect("sample fixture should parse");
    for table in DOGNITION_TABLES {
        assert!(document.table(table).is_some(), "sample fixture lacks {table}");
    }
}

#[test]
fn test_every_catalog_query_executes() {
    let handle = load_sample();
    let registry = dognition_registry().expect("catalog should register");
    let outcome = Runner::default().run(&registry, &handle);

    let errored: Vec<String> = outcome
        .results
        .iter()
        .filter(|r| r.status == CaseStatus::Error)
        .map(|r| format!("{}: {}", r.case_id, r.observed))
        .collect();
    assert!(errored.is_empty(), "catalog queries failed to run:\n{}", errored.join("\n"));
}

#[test]
fn test_trailing_comma_is_rejected_by_the_store() {
    let handle = load_sample();
    let registry = dognition_registry()
        .expect("catalog should register")
        .filtered("ex06-q3");
    let outcome = Runner::default().run(&registry, &handle);
    let result = outcome.result("ex06-q3").expect("ex06-q3 ran");
    assert_eq!(result.status, CaseStatus::Pass);
    assert!(result.observed.starts_with("rejected: "), "{}", result.observed);
}

#[test]
fn test_catalog_values_do_not_match_sample_data() {
    let handle = load_sample();
    let registry = dognition_registry()
        .expect("catalog should register")
        .filtered("ex05-q1");
    let outcome = Runner::default().run(&registry, &handle);
    let result = &outcome.results[0];
    assert_eq!(result.status, CaseStatus::Fail);
    let diff = result.diff.as_deref().unwrap_or_default();
    assert!(diff.contains("Num_Dogs: expected 8466, got 2"), "{diff}");
}
