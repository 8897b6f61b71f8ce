// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    by_test = { ScopeMode::ByTest, "tests/meter/test_reg.py::TestA::test_b", "tests/meter/test_reg.py::TestA::test_b" },
    by_file = { ScopeMode::ByFile, "tests/meter/test_reg.py::TestA::test_b", "tests/meter/test_reg.py" },
    by_module = { ScopeMode::ByModule, "tests/meter/test_reg.py::TestA::test_b", "tests/meter/test_reg" },
    by_module_without_extension = { ScopeMode::ByModule, "suite::case", "suite" },
)]
fn scope_mode_derives_scope(mode: ScopeMode, node_id: &str, expected: &str) {
    assert_eq!(mode.scope_of(node_id), Scope::new(expected));
}

#[test]
fn unmarked_item_without_fixtures_has_no_affinity() {
    let classifier = Classifier::default();
    let (affinity, scope) = classifier.classify(&WorkItemSpec::new("t.py::test_cpu"));

    assert_eq!(affinity, Affinity::None);
    assert_eq!(scope, Scope::new("t.py::test_cpu"));
}

#[test]
fn meter_fixtures_imply_affinity() {
    let classifier = Classifier::default();

    let single = WorkItemSpec::new("t.py::a").with_fixture("tmp_path").with_fixture("meter");
    let multi = WorkItemSpec::new("t.py::b").with_fixture("preinstalled_multi_meter");

    assert_eq!(classifier.classify(&single).0, Affinity::Single);
    assert_eq!(classifier.classify(&multi).0, Affinity::Multi);
}

#[test]
fn explicit_affinity_marker_wins_over_fixture() {
    let classifier = Classifier::default();
    let spec = WorkItemSpec::new("t.py::a")
        .with_fixture("meter")
        .with_marker(Marker::Affinity("plc".to_string()));

    assert_eq!(classifier.classify(&spec).0, Affinity::Named("plc".to_string()));
}

#[test]
fn group_marker_keyword_and_literal() {
    let classifier = Classifier::default();

    let by_file = WorkItemSpec::new("t.py::a").with_marker(Marker::Group("byfile".to_string()));
    let literal = WorkItemSpec::new("t.py::a").with_marker(Marker::Group("firmware".to_string()));

    assert_eq!(classifier.classify(&by_file).1, Scope::new("t.py"));
    assert_eq!(classifier.classify(&literal).1, Scope::new("firmware"));
}

#[test]
fn default_scope_mode_applies_to_unmarked_items() {
    let classifier = Classifier::new(ScopeMode::ByFile);
    assert_eq!(
        classifier.classify(&WorkItemSpec::new("a/b.py::c")).1,
        Scope::new("a/b.py")
    );
}

#[test]
fn affinity_parses_legacy_tags_and_serializes_as_string() {
    assert_eq!(Affinity::from("single_meter"), Affinity::Single);
    assert_eq!(Affinity::from("default"), Affinity::None);

    let json = serde_json::to_string(&Affinity::Multi).unwrap();
    assert_eq!(json, "\"multi\"");
    let back: Affinity = serde_json::from_str("\"gpu\"").unwrap();
    assert_eq!(back, Affinity::Named("gpu".to_string()));
}
