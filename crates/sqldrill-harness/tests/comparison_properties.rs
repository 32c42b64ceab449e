use proptest::prelude::*;

use sqldrill_error::RegistrationError;
use sqldrill_harness::runner::evaluate;
use sqldrill_harness::value::normalize_column_name;
use sqldrill_harness::{Case, CaseRegistry, Expectation, ResultSet, SqlValue};

fn single_column(name: &str, values: Vec<SqlValue>) -> ResultSet {
    ResultSet::new(vec![name.to_owned()], values.into_iter().map(|v| vec![v]).collect())
}

proptest! {
    #[test]
    fn prop_integers_match_their_text_and_real_forms(n in -1_000_000_000i64..1_000_000_000) {
        let expected = SqlValue::Integer(n);
        prop_assert!(expected.matches(&SqlValue::Integer(n)));
        prop_assert!(expected.matches(&SqlValue::Text(n.to_string())));
        #[allow(clippy::cast_precision_loss)]
        let real = n as f64;
        prop_assert!(expected.matches(&SqlValue::Real(real)));
        prop_assert!(!expected.matches(&SqlValue::Integer(n + 1)));
        prop_assert!(!expected.matches(&SqlValue::Null));
    }

    #[test]
    fn prop_numeric_matching_is_symmetric(a in -1.0e12f64..1.0e12, b in -1.0e12f64..1.0e12) {
        let (x, y) = (SqlValue::Real(a), SqlValue::Real(b));
        prop_assert_eq!(x.matches(&y), y.matches(&x));
    }

    #[test]
    fn prop_text_matching_ignores_surrounding_whitespace(word in "[A-Za-z][A-Za-z /-]{0,20}[A-Za-z]") {
        let expected = SqlValue::from(word.as_str());
        let padded = SqlValue::Text(format!("  {word}\t"));
        let suffixed = SqlValue::Text(format!("{word}x"));
        prop_assert!(expected.matches(&padded));
        prop_assert!(!expected.matches(&suffixed));
    }

    #[test]
    fn prop_zero_padded_digit_text_stays_distinct(n in 0u32..100_000, pad in 1usize..4) {
        let padded = format!("{}{n}", "0".repeat(pad));
        prop_assert!(!SqlValue::from(padded.as_str()).matches(&SqlValue::Text(n.to_string())));
        prop_assert!(SqlValue::Integer(i64::from(n)).matches(&SqlValue::Text(padded)));
    }

    #[test]
    fn prop_column_name_normalization_is_idempotent(name in "[A-Za-z_( )*.]{1,30}") {
        let once = normalize_column_name(&name);
        prop_assert_eq!(normalize_column_name(&once), once);
    }

    #[test]
    fn prop_row_count_expectation_tracks_row_count(rows in 0usize..40, expected in 0usize..40) {
        let rs = single_column("n", (0..rows).map(|i| SqlValue::Integer(i64::try_from(i).unwrap_or(0))).collect());
        let outcome = evaluate(&Expectation::RowCount { count: expected }, &rs);
        prop_assert_eq!(outcome.is_ok(), rows == expected);
    }

    #[test]
    fn prop_registry_ids_stay_unique(ids in proptest::collection::vec("[a-c]{1,2}", 1..30)) {
        let mut registry = CaseRegistry::new();
        let mut accepted = std::collections::HashSet::new();
        for id in &ids {
            let result = registry.register(Case::new(id.clone(), "SELECT 1").expect_row_count(1));
            if accepted.insert(id.clone()) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result, Err(RegistrationError::DuplicateId { id: id.clone() }));
            }
        }
        prop_assert_eq!(registry.len(), accepted.len());
        let registered: Vec<&str> = registry.iter().map(|c| c.id.as_str()).collect();
        let mut first_seen = Vec::new();
        for id in &ids {
            if !first_seen.contains(&id.as_str()) {
                first_seen.push(id.as_str());
            }
        }
        prop_assert_eq!(registered, first_seen);
    }
}
