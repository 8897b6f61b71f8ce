// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ms_core::Address;

#[tokio::test]
async fn spawn_names_workers_by_affinity() {
    let host = FakeHost::new();
    let a = host.spawn(&WorkerEnv::single(Address::from("m1"))).await.unwrap();
    let b = host.spawn(&WorkerEnv::plain()).await.unwrap();

    assert_eq!(a, WorkerId::new("single-1"));
    assert_eq!(b, WorkerId::new("none-2"));
    assert_eq!(host.spawned().len(), 2);
}

#[tokio::test]
async fn sent_items_accumulate_per_worker() {
    let host = FakeHost::new();
    let w = host.spawn(&WorkerEnv::plain()).await.unwrap();

    host.send_items(&w, &[0, 2]).await.unwrap();
    host.send_items(&w, &[4]).await.unwrap();

    assert_eq!(host.sent_items(&w), vec![0, 2, 4]);
}

#[tokio::test]
async fn unknown_worker_calls_fail_but_are_recorded() {
    let host = FakeHost::new();
    let ghost = WorkerId::new("ghost");

    assert_eq!(host.shutdown(&ghost).await, Err(HostError::NotFound(ghost.clone())));
    assert!(host.was_shut_down(&ghost));
}

#[tokio::test]
async fn injected_spawn_failures() {
    let host = FakeHost::new();
    host.fail_spawns(1);

    assert!(host.spawn(&WorkerEnv::plain()).await.is_err());
    assert!(host.spawn(&WorkerEnv::plain()).await.is_ok());
}

#[tokio::test]
async fn wait_exit_forgets_worker_unless_stalled() {
    let host = FakeHost::new();
    let quick = host.spawn(&WorkerEnv::plain()).await.unwrap();
    let stuck = host.spawn(&WorkerEnv::plain()).await.unwrap();
    host.stall_exit(&stuck);

    assert_eq!(host.wait_exit(&quick, Duration::ZERO).await, Ok(true));
    assert_eq!(host.wait_exit(&stuck, Duration::from_secs(1)).await, Ok(false));

    assert_eq!(host.exited(), vec![quick.clone()]);
    assert_eq!(
        host.terminate(&quick).await,
        Err(HostError::NotFound(quick))
    );
    assert!(host.terminate(&stuck).await.is_ok());
}
