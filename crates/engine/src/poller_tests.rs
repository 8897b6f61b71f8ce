// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ms_adapters::{FakeHost, HostCall};
use ms_core::{FakeClock, Resource};
use ms_storage::{MemoryLockStore, StoreCall};

const HOST: &str = "runner-a";

fn config() -> SchedulerConfig {
    SchedulerConfig {
        lock_timeout: Duration::from_secs(2),
        poll_interval: Duration::ZERO,
        holder_host: Some(HOST.to_string()),
        ..SchedulerConfig::default()
    }
}

fn addr(s: &str) -> Address {
    Address::new(s)
}

fn setup(
    resources: Vec<Resource>,
    config: SchedulerConfig,
) -> (ResourcePoller<MemoryLockStore, FakeClock>, MemoryLockStore, FakeHost, FakeClock) {
    let store = MemoryLockStore::with_resources(resources);
    let clock = FakeClock::new();
    let poller = ResourcePoller::new(store.clone(), clock.clone(), &config);
    (poller, store, FakeHost::new(), clock)
}

fn singles(n: usize) -> Demand {
    Demand { single: n, multi: 0 }
}

fn multis(n: usize) -> Demand {
    Demand { single: 0, multi: n }
}

#[tokio::test]
async fn locks_free_meter_and_spawns_bound_worker() {
    let (mut poller, store, host, _) = setup(vec![Resource::new("10.0.0.1")], config());

    let spawned = poller.poll(&host, singles(1)).await.unwrap();

    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].affinity, Affinity::Single);
    assert_eq!(spawned[0].meters, vec![addr("10.0.0.1")]);
    let row = store.resource(&addr("10.0.0.1")).unwrap();
    assert!(row.busy);
    assert_eq!(row.owner_host.as_deref(), Some(HOST));
    assert_eq!(row.busy_change_count, 1);

    let (_, env) = &host.spawned()[0];
    assert_eq!(env.meter, Some(addr("10.0.0.1")));
    assert_eq!(poller.ledger().single_count(), 1);
    assert_eq!(poller.phase(Category::Single), Phase::Running);
}

#[tokio::test]
async fn acquires_no_more_than_demand() {
    let (mut poller, store, host, _) = setup(
        vec![Resource::new("a"), Resource::new("b"), Resource::new("c")],
        config(),
    );

    let spawned = poller.poll(&host, singles(2)).await.unwrap();

    assert_eq!(spawned.len(), 2);
    assert_eq!(store.busy_addresses().len(), 2);
    assert_eq!(store.lock_calls(), 2);
}

#[tokio::test]
async fn ceiling_bounds_held_meters() {
    let cfg = SchedulerConfig {
        max_resources: 1,
        ..config()
    };
    let (mut poller, store, host, _) = setup(vec![Resource::new("a"), Resource::new("b")], cfg);

    poller.poll(&host, singles(2)).await.unwrap();
    let again = poller.poll(&host, singles(2)).await.unwrap();

    assert!(again.is_empty());
    assert_eq!(store.busy_addresses(), vec![addr("a")]);
    assert_eq!(poller.ledger().total_held(), 1);
}

#[tokio::test]
async fn skips_meters_busy_in_listing_and_lost_races() {
    let (mut poller, store, host, _) = setup(
        vec![Resource::new("a"), Resource::new("b"), Resource::new("c")],
        config(),
    );
    store.mark_busy(&addr("a"), "runner-b");
    store.lose_next_lock(&addr("b"));

    let spawned = poller.poll(&host, singles(1)).await.unwrap();

    assert_eq!(spawned[0].meters, vec![addr("c")]);
    // "a" is never tried since the listing already shows it busy
    assert!(!store
        .calls()
        .contains(&StoreCall::TryLock { address: addr("a"), holder: HOST.to_string() }));
}

#[tokio::test]
async fn allow_list_restricts_candidates() {
    let cfg = SchedulerConfig {
        meters: vec![addr("b")],
        ..config()
    };
    let (mut poller, store, host, _) = setup(vec![Resource::new("a"), Resource::new("b")], cfg);

    poller.poll(&host, singles(2)).await.unwrap();

    assert_eq!(store.busy_addresses(), vec![addr("b")]);
}

#[tokio::test]
async fn poll_respects_interval_but_poll_now_does_not() {
    let cfg = SchedulerConfig {
        poll_interval: Duration::from_secs(5),
        ..config()
    };
    let (mut poller, store, host, clock) =
        setup(vec![Resource::new("a"), Resource::new("b")], cfg);

    poller.poll(&host, singles(1)).await.unwrap();
    assert!(poller.poll(&host, singles(1)).await.unwrap().is_empty());
    assert_eq!(store.busy_addresses().len(), 1);

    clock.advance(Duration::from_secs(5));
    assert_eq!(poller.poll(&host, singles(1)).await.unwrap().len(), 1);

    store.mark_free(&addr("a"));
    assert_eq!(poller.poll_now(&host, singles(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn lock_timeout_is_fatal_when_nothing_held() {
    let (mut poller, store, host, clock) = setup(vec![Resource::new("a")], config());
    store.mark_busy(&addr("a"), "runner-b");

    assert!(poller.poll(&host, singles(1)).await.unwrap().is_empty());
    assert_eq!(poller.phase(Category::Single), Phase::AwaitingLock);

    clock.advance(Duration::from_secs(2));
    assert!(poller.poll(&host, singles(1)).await.is_ok());

    clock.advance(Duration::from_millis(1));
    let err = poller.poll(&host, singles(1)).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::LockTimeout { category: Category::Single, .. }
    ));
    assert_eq!(err.cause(), Some(crate::FatalCause::NoResources));
    assert!(host.spawned().is_empty());
}

#[tokio::test]
async fn lock_timeout_does_not_fire_while_category_holds_a_meter() {
    let (mut poller, store, host, clock) =
        setup(vec![Resource::new("a"), Resource::new("b")], config());
    store.mark_busy(&addr("b"), "runner-b");

    poller.poll(&host, singles(2)).await.unwrap();
    clock.advance(Duration::from_secs(10));

    assert!(poller.poll(&host, singles(1)).await.unwrap().is_empty());
    assert_eq!(poller.phase(Category::Single), Phase::Running);
}

#[tokio::test]
async fn empty_lock_table_fails_fast() {
    let (mut poller, _, host, _) = setup(Vec::new(), config());

    let err = poller.poll(&host, singles(1)).await.unwrap_err();

    assert!(matches!(err, SessionError::NoResources { category: Category::Single }));
}

#[tokio::test]
async fn no_demand_touches_nothing() {
    let (mut poller, store, host, _) = setup(Vec::new(), config());

    assert!(poller.poll(&host, Demand::default()).await.unwrap().is_empty());
    assert!(store.calls().is_empty());
    assert_eq!(poller.phase(Category::Single), Phase::Idle);
}

#[tokio::test]
async fn spawn_failure_unlocks_the_meter() {
    let (mut poller, store, host, _) = setup(vec![Resource::new("a")], config());
    host.fail_spawns(1);

    assert!(poller.poll(&host, singles(1)).await.unwrap().is_empty());

    assert!(store.busy_addresses().is_empty());
    assert_eq!(store.unlock_calls(&addr("a")), 1);
    assert_eq!(poller.ledger().total_held(), 0);
}

fn pair(name: &str, a: &str, b: &str) -> Vec<Resource> {
    vec![
        Resource::new(a).with_peer_group(name),
        Resource::new(b).with_peer_group(name),
    ]
}

#[tokio::test]
async fn locks_whole_group_for_multi_worker() {
    let (mut poller, store, host, _) = setup(pair("p1", "a", "b"), config());

    let spawned = poller.poll(&host, multis(1)).await.unwrap();

    assert_eq!(spawned[0].affinity, Affinity::Multi);
    assert_eq!(spawned[0].meters, vec![addr("a"), addr("b")]);
    assert_eq!(store.busy_addresses().len(), 2);
    let (_, env) = &host.spawned()[0];
    assert_eq!(env.multi_meters, vec![addr("a"), addr("b")]);
    assert_eq!(poller.ledger().group_count(), 1);
    assert_eq!(poller.ledger().multi_count(), 2);
}

#[tokio::test]
async fn group_with_a_busy_member_is_never_touched() {
    let (mut poller, store, host, _) = setup(pair("p1", "a", "b"), config());
    store.mark_busy(&addr("b"), "runner-b");

    for _ in 0..3 {
        assert!(poller.poll(&host, multis(1)).await.unwrap().is_empty());
    }
    assert_eq!(store.lock_calls(), 0);
    assert_eq!(store.resource(&addr("a")).unwrap().busy_change_count, 0);

    store.mark_free(&addr("b"));
    assert_eq!(poller.poll(&host, multis(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn partial_group_lock_is_rolled_back() {
    let (mut poller, store, host, _) = setup(pair("p1", "a", "b"), config());
    store.lose_next_lock(&addr("b"));

    assert!(poller.poll(&host, multis(1)).await.unwrap().is_empty());

    assert!(store.busy_addresses().is_empty());
    assert_eq!(store.unlock_calls(&addr("a")), 1);
    assert!(host.spawned().is_empty());

    // Next cycle succeeds
    assert_eq!(poller.poll(&host, multis(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn group_retry_limit_bounds_rollbacks() {
    let cfg = SchedulerConfig {
        group_retry_limit: Some(1),
        ..config()
    };
    let (mut poller, store, host, _) = setup(pair("p1", "a", "b"), cfg);

    store.lose_next_lock(&addr("b"));
    assert!(poller.poll(&host, multis(1)).await.is_ok());
    store.lose_next_lock(&addr("b"));
    let err = poller.poll(&host, multis(1)).await.unwrap_err();

    assert!(matches!(err, SessionError::GroupRetriesExhausted { attempts: 2 }));
    assert!(store.busy_addresses().is_empty());
}

#[tokio::test]
async fn singleton_and_oversized_groups_are_skipped() {
    let cfg = SchedulerConfig {
        max_resources: 2,
        ..config()
    };
    let mut resources = vec![Resource::new("solo").with_peer_group("p0")];
    resources.extend(
        ["x", "y", "z"]
            .iter()
            .map(|a| Resource::new(*a).with_peer_group("big")),
    );
    resources.extend(pair("p1", "a", "b"));
    let (mut poller, store, host, _) = setup(resources, cfg);

    let spawned = poller.poll(&host, multis(3)).await.unwrap();

    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].meters, vec![addr("a"), addr("b")]);
    assert_eq!(store.lock_calls(), 2);
}

#[tokio::test]
async fn release_worker_unlocks_exactly_its_meters() {
    let (mut poller, store, host, _) =
        setup(vec![Resource::new("a"), Resource::new("b")], config());
    let spawned = poller.poll(&host, singles(2)).await.unwrap();
    let worker = spawned[0].worker.clone();

    let holding = poller.release_worker(&worker).await.unwrap();

    assert_eq!(holding.unwrap().addresses(), spawned[0].meters);
    assert_eq!(store.busy_addresses(), spawned[1].meters);
    assert!(poller.release_worker(&worker).await.unwrap().is_none());
    assert_eq!(store.unlock_calls(&spawned[0].meters[0]), 1);
}

#[tokio::test]
async fn releasing_last_meter_moves_category_to_released() {
    let (mut poller, _, host, _) = setup(vec![Resource::new("a")], config());
    let spawned = poller.poll(&host, singles(1)).await.unwrap();

    poller.release_worker(&spawned[0].worker).await.unwrap();

    assert_eq!(poller.phase(Category::Single), Phase::Released);
}

#[tokio::test]
async fn release_all_reconciles_against_store() {
    let (mut poller, store, host, _) = setup(
        vec![Resource::new("a"), Resource::new("b"), Resource::new("c")],
        config(),
    );
    poller.poll(&host, singles(3)).await.unwrap();
    // Freed externally, then re-locked by another runner
    store.mark_free(&addr("b"));
    store.mark_free(&addr("c"));
    store.mark_busy(&addr("c"), "runner-b");

    let released = poller.release_all().await.unwrap();

    assert_eq!(released, vec![addr("a")]);
    assert_eq!(store.busy_addresses(), vec![addr("c")]);
    assert_eq!(store.resource(&addr("c")).unwrap().owner_host.as_deref(), Some("runner-b"));
    assert_eq!(poller.ledger().total_held(), 0);
}

#[tokio::test]
async fn release_all_attempts_every_entry_before_failing() {
    let (mut poller, store, host, _) =
        setup(vec![Resource::new("a"), Resource::new("b")], config());
    poller.poll(&host, singles(2)).await.unwrap();
    // Both the read and the unlock of "a" fail
    store.fail_next(StoreError::Backend("disk I/O error".to_string()));
    store.fail_next(StoreError::Backend("disk I/O error".to_string()));

    let err = poller.release_all().await.unwrap_err();

    assert!(matches!(err, SessionError::Store(StoreError::Backend(_))));
    assert_eq!(poller.ledger().total_held(), 0);
    assert_eq!(store.busy_addresses(), vec![addr("a")]);
    assert_eq!(poller.leaked(), &[addr("a")]);

    // A later pass picks it up again
    assert_eq!(poller.release_all().await.unwrap(), vec![addr("a")]);
    assert!(store.busy_addresses().is_empty());
}

#[tokio::test]
async fn failed_group_release_tries_every_member_and_leaves_rest_for_shutdown() {
    let (mut poller, store, host, _) = setup(pair("p1", "a", "b"), config());
    let spawned = poller.poll(&host, multis(1)).await.unwrap();
    store.fail_next(StoreError::Unreachable {
        operation: "unlock".to_string(),
        attempts: 10,
        message: "connection refused".to_string(),
    });

    let err = poller.release_worker(&spawned[0].worker).await.unwrap_err();

    assert!(matches!(err, SessionError::StoreUnreachable(_)));
    assert_eq!(store.unlock_calls(&addr("b")), 1);
    assert_eq!(store.busy_addresses(), vec![addr("a")]);
    assert_eq!(poller.leaked(), &[addr("a")]);

    assert_eq!(poller.release_all().await.unwrap(), vec![addr("a")]);
    assert!(store.busy_addresses().is_empty());
    assert!(poller.leaked().is_empty());
}

#[tokio::test]
async fn worker_env_carries_lock_socket() {
    let cfg = SchedulerConfig {
        lock_socket: Some(PathBuf::from("/tmp/ms.sock")),
        ..config()
    };
    let (mut poller, _, host, _) = setup(vec![Resource::new("a")], cfg);

    poller.poll(&host, singles(1)).await.unwrap();

    let calls = host.calls();
    let Some(HostCall::Spawn { env, .. }) = calls.first() else {
        panic!("expected a spawn");
    };
    assert_eq!(env.lock_socket, Some(PathBuf::from("/tmp/ms.sock")));
}
