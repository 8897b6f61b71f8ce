// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::work::Marker;

fn w(id: &str) -> WorkerId {
    WorkerId::new(id)
}

/// Five items: three plain, two needing a single meter
fn mixed_collection() -> Vec<WorkItemSpec> {
    vec![
        WorkItemSpec::new("t.py::cpu_a"),
        WorkItemSpec::new("t.py::meter_a").with_fixture("meter"),
        WorkItemSpec::new("t.py::cpu_b"),
        WorkItemSpec::new("t.py::meter_b").with_marker(Marker::Affinity("single".to_string())),
        WorkItemSpec::new("t.py::cpu_c"),
    ]
}

fn router() -> AffinityRouter {
    AffinityRouter::new(Classifier::default())
}

#[test]
fn collection_is_partitioned_by_affinity() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    assert!(router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap());

    let none = router.group(&Affinity::None).unwrap();
    let single = router.group(&Affinity::Single).unwrap();
    assert_eq!(none.unclaimed_scopes(), 3);
    assert_eq!(single.unclaimed_scopes(), 2);
    assert_eq!(router.item(1).unwrap().affinity, Affinity::Single);
}

#[test]
fn workers_only_see_their_affinity() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.register_worker(w("m0"), Affinity::Single).unwrap();
    router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap();
    router.on_collection_ready(&w("m0"), &mixed_collection()).unwrap();

    assert_eq!(router.next_assignment(&w("gw0")).unwrap(), Some(0));
    assert_eq!(router.next_assignment(&w("m0")).unwrap(), Some(1));
    assert_eq!(router.next_assignment(&w("m0")).unwrap(), Some(3));
    assert_eq!(router.next_assignment(&w("m0")).unwrap(), None);
}

#[test]
fn second_collection_must_match() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.register_worker(w("gw1"), Affinity::None).unwrap();
    router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap();

    let shorter = &mixed_collection()[..3];
    assert_eq!(
        router.on_collection_ready(&w("gw1"), shorter),
        Err(RouterError::CollectionMismatch {
            worker: w("gw1"),
            expected: 5,
            got: 3
        })
    );
}

#[test]
fn collection_ready_admits_only_once() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    assert!(router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap());
    assert!(!router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap());
}

#[test]
fn nodes_include_pending_and_live_workers() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.register_worker(w("m0"), Affinity::Single).unwrap();
    router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap();

    let mut nodes = router.nodes();
    nodes.sort();
    assert_eq!(nodes, vec![w("gw0"), w("m0")]);

    router.remove_worker(&w("m0")).unwrap();
    assert_eq!(router.nodes(), vec![w("gw0")]);
}

#[test]
fn completing_an_item_of_another_affinity_fails() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap();

    assert!(matches!(
        router.mark_complete(&w("gw0"), 1),
        Err(RouterError::Group(GroupError::NotAssigned { .. }))
    ));
    assert_eq!(router.mark_complete(&w("gw0"), 42), Err(RouterError::UnknownItem(42)));
}

#[test]
fn tests_finished_after_every_group_drains() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.register_worker(w("m0"), Affinity::Single).unwrap();
    router.on_collection_ready(&w("gw0"), &mixed_collection()).unwrap();
    router.on_collection_ready(&w("m0"), &mixed_collection()).unwrap();

    while let Some(index) = router.next_assignment(&w("gw0")).unwrap() {
        router.mark_complete(&w("gw0"), index).unwrap();
    }
    assert!(!router.tests_finished());
    assert!(router.has_pending_work());

    while let Some(index) = router.next_assignment(&w("m0")).unwrap() {
        router.mark_complete(&w("m0"), index).unwrap();
    }
    assert!(router.tests_finished());
    assert!(router.item(3).unwrap().completed);
}

#[test]
fn late_group_for_unused_affinity_is_finished() {
    let mut router = router();
    router.register_worker(w("gw0"), Affinity::None).unwrap();
    router.on_collection_ready(&w("gw0"), &[WorkItemSpec::new("t.py::a")]).unwrap();
    router.register_worker(w("p0"), Affinity::Multi).unwrap();

    let multi = router.group(&Affinity::Multi).unwrap();
    assert!(multi.collection_complete());
    assert!(multi.tests_finished());
}
