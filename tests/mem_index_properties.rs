//! Property tests for the in-memory document index
//!
//! Every lookup is cross-checked against a brute-force scan of the same
//! documents.

use std::collections::HashSet;

use compositedb::mindex::{Key, KeySpec, LookupSpec, MemDocIndex};
use compositedb::query::Path;
use proptest::prelude::*;
use serde_json::{json, Value};

fn int_docs(values: &[Option<i64>]) -> Vec<Value> {
    values
        .iter()
        .map(|v| match v {
            Some(v) => json!({"v": v}),
            None => json!({"other": 1}),
        })
        .collect()
}

fn index_of(docs: &[Value], field: &str) -> MemDocIndex<usize> {
    let mut index = MemDocIndex::new(KeySpec::Simple(Path::parse(field)));
    for (i, doc) in docs.iter().enumerate() {
        index.add(i, doc);
    }
    index
}

fn scan(docs: &[Value], pred: impl Fn(&Value) -> bool) -> HashSet<usize> {
    docs.iter().enumerate().filter(|(_, d)| pred(d)).map(|(i, _)| i).collect()
}

proptest! {
    #[test]
    fn value_lookup_is_exact(values in prop::collection::vec(prop::option::of(-5i64..5), 0..20), k in -6i64..6) {
        let docs = int_docs(&values);
        let index = index_of(&docs, "v");
        let found = index.find(&LookupSpec::Value(Key::Int(k)));
        prop_assert_eq!(found, scan(&docs, |d| d["v"] == json!(k)));
    }

    #[test]
    fn null_lookup_finds_missing_fields(values in prop::collection::vec(prop::option::of(-5i64..5), 0..20)) {
        let docs = int_docs(&values);
        let index = index_of(&docs, "v");
        let found = index.find(&LookupSpec::Value(Key::Null));
        prop_assert_eq!(found, scan(&docs, |d| d.get("v").is_none()));
    }

    #[test]
    fn array_values_are_indexed_per_element(
        arrays in prop::collection::vec(prop::collection::vec(-4i64..4, 0..4), 0..15),
        k in -4i64..4,
    ) {
        let docs: Vec<Value> = arrays.iter().map(|a| json!({"v": a})).collect();
        let index = index_of(&docs, "v");
        let found = index.find(&LookupSpec::Value(Key::Int(k)));
        prop_assert_eq!(found, scan(&docs, |d| d["v"].as_array().map(|a| a.contains(&json!(k))).unwrap_or(false)));
    }

    #[test]
    fn range_lookup_matches_scan(
        values in prop::collection::vec(prop::option::of(-10i64..10), 0..25),
        min in prop::option::of(-12i64..12),
        max in prop::option::of(-12i64..12),
    ) {
        let docs = int_docs(&values);
        let index = index_of(&docs, "v");
        let lookup = LookupSpec::Range { min: min.map(Key::Int), max: max.map(Key::Int) };
        let found = index.find(&lookup);
        let expected = scan(&docs, |d| match d.get("v").and_then(Value::as_i64) {
            Some(v) => min.map(|m| v >= m).unwrap_or(true) && max.map(|m| v <= m).unwrap_or(true),
            None => false,
        });
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prefix_lookup_matches_scan(
        strings in prop::collection::vec("[abA]{0,4}", 0..20),
        prefix in "[abA]{0,2}",
        case_insensitive in any::<bool>(),
    ) {
        let docs: Vec<Value> = strings.iter().map(|s| json!({"s": s})).collect();
        let index = index_of(&docs, "s");
        let lookup = LookupSpec::Prefix { prefix: prefix.clone(), case_insensitive };
        let found = index.find(&lookup);
        let expected = scan(&docs, |d| {
            let s = d["s"].as_str().unwrap_or_default();
            if case_insensitive {
                s.to_lowercase().starts_with(&prefix.to_lowercase())
            } else {
                s.starts_with(prefix.as_str())
            }
        });
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn multi_value_lookup_is_union_of_single_lookups(
        values in prop::collection::vec(prop::option::of(-5i64..5), 0..20),
        keys in prop::collection::vec(-6i64..6, 0..4),
    ) {
        let docs = int_docs(&values);
        let index = index_of(&docs, "v");
        let multi = index.find(&LookupSpec::MultiValue(keys.iter().copied().map(Key::Int).collect()));
        let union: HashSet<usize> = keys
            .iter()
            .flat_map(|&k| index.find(&LookupSpec::Value(Key::Int(k))))
            .collect();
        prop_assert_eq!(multi, union);
    }

    #[test]
    fn composite_lookup_matches_both_fields(
        pairs in prop::collection::vec((0i64..3, 0i64..3), 0..20),
        a in 0i64..3,
        b in 0i64..3,
    ) {
        let docs: Vec<Value> = pairs.iter().map(|(x, y)| json!({"x": x, "y": y})).collect();
        let spec = KeySpec::Composite(vec![KeySpec::Simple(Path::parse("x")), KeySpec::Simple(Path::parse("y"))]);
        let mut index = MemDocIndex::new(spec);
        for (i, doc) in docs.iter().enumerate() {
            index.add(i, doc);
        }
        let lookup = LookupSpec::Composite(vec![LookupSpec::Value(Key::Int(a)), LookupSpec::Value(Key::Int(b))]);
        let found = index.find(&lookup);
        prop_assert_eq!(found, scan(&docs, |d| d["x"] == json!(a) && d["y"] == json!(b)));
    }

    #[test]
    fn composite_compare_is_lexicographic(
        a in (-3i64..3, "[a-c]{0,2}"),
        b in (-3i64..3, "[a-c]{0,2}"),
    ) {
        let spec = KeySpec::Composite(vec![KeySpec::Simple(Path::parse("n")), KeySpec::Simple(Path::parse("s"))]);
        let key_of = |doc: Value| spec.extract(&doc).into_iter().next();
        let ka = key_of(json!({"n": a.0, "s": a.1})).unwrap();
        let kb = key_of(json!({"n": b.0, "s": b.1})).unwrap();
        prop_assert_eq!(spec.compare(&ka, &kb).unwrap(), a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        prop_assert_eq!(spec.compare(&kb, &ka).unwrap(), spec.compare(&ka, &kb).unwrap().reverse());
        prop_assert_eq!(spec.compare(&ka, &Key::Null).unwrap(), std::cmp::Ordering::Greater);
    }
}
