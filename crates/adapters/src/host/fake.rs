// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake worker host for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{HostError, WorkerHost};
use async_trait::async_trait;
use ms_core::{ItemIndex, WorkerEnv, WorkerId};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded host call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Spawn { worker: WorkerId, env: WorkerEnv },
    SendItems { worker: WorkerId, items: Vec<ItemIndex> },
    Shutdown { worker: WorkerId },
    Terminate { worker: WorkerId },
    WaitExit { worker: WorkerId, grace: Duration },
}

#[derive(Debug, Default)]
struct FakeHostState {
    workers: BTreeMap<WorkerId, WorkerEnv>,
    calls: Vec<HostCall>,
    next_id: u64,
    fail_spawns: usize,
    /// Workers that never exit on their own
    stuck: BTreeSet<WorkerId>,
    exited: Vec<WorkerId>,
}

/// Fake worker host for testing
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<FakeHostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<HostCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// The next `n` spawns fail
    pub fn fail_spawns(&self, n: usize) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_spawns = n;
    }

    /// Workers started so far, in order
    pub fn spawned(&self) -> Vec<(WorkerId, WorkerEnv)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Spawn { worker, env } => Some((worker, env)),
                _ => None,
            })
            .collect()
    }

    /// Every item sent to a worker, in order
    pub fn sent_items(&self, worker: &WorkerId) -> Vec<ItemIndex> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::SendItems { worker: w, items } if w == *worker => Some(items),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn was_shut_down(&self, worker: &WorkerId) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, HostCall::Shutdown { worker: w } if w == worker))
    }

    pub fn was_terminated(&self, worker: &WorkerId) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, HostCall::Terminate { worker: w } if w == worker))
    }

    /// `wait_exit` on this worker always runs out its grace
    pub fn stall_exit(&self, worker: &WorkerId) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stuck
            .insert(worker.clone());
    }

    /// Workers reaped by `wait_exit`, in order
    pub fn exited(&self) -> Vec<WorkerId> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .exited
            .clone()
    }

    fn record(&self, worker: &WorkerId, call: HostCall) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(call);
        if !state.workers.contains_key(worker) {
            return Err(HostError::NotFound(worker.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerHost for FakeHost {
    async fn spawn(&self, env: &WorkerEnv) -> Result<WorkerId, HostError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_spawns > 0 {
            state.fail_spawns -= 1;
            return Err(HostError::SpawnFailed("injected failure".to_string()));
        }
        state.next_id += 1;
        let worker = WorkerId::new(format!("{}-{}", env.affinity, state.next_id));
        state.workers.insert(worker.clone(), env.clone());
        state.calls.push(HostCall::Spawn {
            worker: worker.clone(),
            env: env.clone(),
        });
        Ok(worker)
    }

    async fn send_items(&self, worker: &WorkerId, items: &[ItemIndex]) -> Result<(), HostError> {
        self.record(
            worker,
            HostCall::SendItems {
                worker: worker.clone(),
                items: items.to_vec(),
            },
        )
    }

    async fn shutdown(&self, worker: &WorkerId) -> Result<(), HostError> {
        self.record(
            worker,
            HostCall::Shutdown {
                worker: worker.clone(),
            },
        )
    }

    async fn terminate(&self, worker: &WorkerId) -> Result<(), HostError> {
        self.record(
            worker,
            HostCall::Terminate {
                worker: worker.clone(),
            },
        )
    }

    async fn wait_exit(&self, worker: &WorkerId, grace: Duration) -> Result<bool, HostError> {
        self.record(
            worker,
            HostCall::WaitExit {
                worker: worker.clone(),
                grace,
            },
        )?;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stuck.contains(worker) {
            return Ok(false);
        }
        state.workers.remove(worker);
        state.exited.push(worker.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
