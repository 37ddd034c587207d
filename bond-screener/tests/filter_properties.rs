//! Property-based tests for the filter engine.
//!
//! These tests verify that the filter laws hold across random datasets and
//! criteria sets, using the `proptest` crate for random test case generation.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use bond_screener::data::{Dataset, Instrument, Value};
use bond_screener::screener::filter::apply;
use bond_screener::screener::{CriteriaSet, Criterion, Operator, Threshold};

// =============================================================================
// Generators
// =============================================================================

const CURRENCIES: &[&str] = &["SUR", "USD", "CNY", "EUR"];

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn arb_ordering() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Lt),
        Just(Operator::Le),
        Just(Operator::Gt),
        Just(Operator::Ge),
        Just(Operator::Eq),
        Just(Operator::Ne),
    ]
}

fn arb_currency() -> impl Strategy<Value = String> {
    prop::sample::select(CURRENCIES).prop_map(String::from)
}

/// Generates one bond's optional attributes.
fn arb_attributes() -> impl Strategy<Value = (Option<f64>, Option<i64>, Option<String>)> {
    (
        proptest::option::of((0u32..200).prop_map(|y| f64::from(y) / 10.0)),
        proptest::option::of(0i64..2500),
        proptest::option::of(arb_currency()),
    )
}

/// Generates a dataset with unique SECIDs.
fn arb_dataset(max_count: usize) -> impl Strategy<Value = Dataset> {
    proptest::collection::vec(arb_attributes(), 0..=max_count).prop_map(|rows| {
        let bonds = rows
            .into_iter()
            .enumerate()
            .map(|(i, (yld, days, currency))| {
                let mut bond = Instrument::new(format!("RU{:04}", i), "TQCB");
                if let Some(y) = yld {
                    bond.set("YIELD", Value::Number(y));
                }
                if let Some(d) = days {
                    bond.set("MATDATE", Value::Date(base_date() + Duration::days(d)));
                }
                if let Some(c) = currency {
                    bond.set("FACEUNIT", Value::Text(c));
                }
                bond
            })
            .collect();
        Dataset::from_instruments(bonds)
    })
}

/// Generates a criterion that is valid for the generated attribute kinds.
fn arb_criterion() -> impl Strategy<Value = Criterion> {
    prop_oneof![
        (arb_ordering(), 0u32..200).prop_map(|(op, y)| {
            Criterion::new("yield", op, Threshold::Scalar(Value::Number(f64::from(y) / 10.0)))
                .unwrap()
        }),
        (arb_ordering(), 0i64..2500).prop_map(|(op, d)| {
            Criterion::new(
                "maturity_date",
                op,
                Threshold::Scalar(Value::Date(base_date() + Duration::days(d))),
            )
            .unwrap()
        }),
        (
            prop_oneof![Just(Operator::In), Just(Operator::NotIn)],
            proptest::collection::vec(arb_currency(), 0..3)
        )
            .prop_map(|(op, list)| {
                let values = list.into_iter().map(Value::Text).collect();
                Criterion::new("face_unit", op, Threshold::List(values)).unwrap()
            }),
        (prop_oneof![Just(Operator::Eq), Just(Operator::Ne)], arb_currency()).prop_map(
            |(op, c)| Criterion::new("FACEUNIT", op, Threshold::Scalar(Value::Text(c))).unwrap()
        ),
    ]
}

fn arb_criteria(max_count: usize) -> impl Strategy<Value = CriteriaSet> {
    proptest::collection::vec(arb_criterion(), 0..=max_count).prop_map(CriteriaSet::new)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Empty criteria return the input unchanged.
    #[test]
    fn prop_empty_criteria_is_identity(dataset in arb_dataset(30)) {
        let out = apply(&dataset, &CriteriaSet::default()).unwrap();
        prop_assert_eq!(out, dataset);
    }

    /// Filtering twice with the same criteria equals filtering once.
    #[test]
    fn prop_filter_is_idempotent(dataset in arb_dataset(30), criteria in arb_criteria(4)) {
        let once = apply(&dataset, &criteria).unwrap();
        let twice = apply(&once, &criteria).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Kept bonds satisfy every criterion; dropped bonds violate at least one.
    #[test]
    fn prop_filter_is_sound_and_complete(dataset in arb_dataset(30), criteria in arb_criteria(4)) {
        let out = apply(&dataset, &criteria).unwrap();
        let kept: Vec<&str> = out.secids();

        for bond in &dataset {
            let all_hold = criteria.iter().all(|c| c.matches(bond).unwrap());
            prop_assert_eq!(all_hold, kept.contains(&bond.secid()), "bond {}", bond.secid());
        }
    }

    /// Output preserves input order and never invents rows.
    #[test]
    fn prop_filter_preserves_order(dataset in arb_dataset(30), criteria in arb_criteria(4)) {
        let out = apply(&dataset, &criteria).unwrap();
        let input = dataset.secids();
        let mut cursor = 0;
        for secid in out.secids() {
            let pos = input[cursor..].iter().position(|s| *s == secid);
            prop_assert!(pos.is_some(), "{} out of order or unknown", secid);
            cursor += pos.unwrap() + 1;
        }
    }

    /// A bond without the referenced attributes is never kept.
    #[test]
    fn prop_missing_attributes_excluded(dataset in arb_dataset(20), criteria in arb_criteria(4)) {
        prop_assume!(!criteria.is_empty());

        let mut bonds = dataset.into_instruments();
        bonds.push(Instrument::new("BARE", "TQCB"));
        let dataset = Dataset::from_instruments(bonds);

        let out = apply(&dataset, &criteria).unwrap();
        prop_assert!(!out.secids().contains(&"BARE"));
    }
}
