// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-facing scheduler
//!
//! Ties the affinity router to the resource poller behind one lock. The
//! host framework calls in from its own tasks as workers register, collect,
//! complete items, and exit.

use crate::error::{Category, SessionError};
use crate::poller::{Demand, Phase, ResourcePoller};
use ms_adapters::WorkerHost;
use ms_core::{
    Address, Affinity, AffinityGroupQueue, AffinityRouter, Clock, ItemIndex, SchedulerConfig,
    WorkItemSpec, Worker, WorkerId,
};
use ms_storage::LockStore;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

struct SessionState<S, C> {
    router: AffinityRouter,
    poller: ResourcePoller<S, C>,
    started: bool,
    closed: bool,
    /// Workers already told there is nothing left for them
    shutting_down: BTreeSet<WorkerId>,
}

pub struct Scheduler<S, H, C> {
    host: H,
    prefetch: usize,
    exit_grace: Duration,
    state: Mutex<SessionState<S, C>>,
}

impl<S, H, C> Scheduler<S, H, C>
where
    S: LockStore,
    H: WorkerHost,
    C: Clock,
{
    pub fn new(store: S, host: H, clock: C, config: &SchedulerConfig) -> Self {
        Self {
            host,
            prefetch: config.prefetch.max(1),
            exit_grace: config.exit_grace,
            state: Mutex::new(SessionState {
                router: AffinityRouter::new(config.classifier()),
                poller: ResourcePoller::new(store, clock, config),
                started: false,
                closed: false,
                shutting_down: BTreeSet::new(),
            }),
        }
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, SessionState<S, C>>, SessionError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(SessionError::Closed);
        }
        Ok(state)
    }

    /// A worker registered with the host. Workers started by the poller are
    /// registered already, so repeating the same affinity is a no-op.
    pub async fn add_node(&self, worker: WorkerId, affinity: Affinity) -> Result<(), SessionError> {
        let mut state = self.lock_open().await?;
        if state.router.affinity_of(&worker).is_ok_and(|known| *known == affinity) {
            return Ok(());
        }
        tracing::info!(%worker, %affinity, "worker added");
        state.router.register_worker(worker, affinity)?;
        Ok(())
    }

    /// A worker finished collecting and can receive items
    pub async fn add_node_collection(
        &self,
        worker: &WorkerId,
        items: &[WorkItemSpec],
    ) -> Result<(), SessionError> {
        let mut state = self.lock_open().await?;
        if state.router.on_collection_ready(worker, items)? {
            tracing::info!(%worker, items = items.len(), "worker collection accepted");
        }
        if state.started {
            self.dispatch(&mut state, worker).await?;
            self.acquire(&mut state, false).await?;
        }
        Ok(())
    }

    /// Start handing out work and look for meters at once
    pub async fn schedule(&self) -> Result<(), SessionError> {
        let mut state = self.lock_open().await?;
        state.started = true;
        let workers: Vec<WorkerId> = state
            .router
            .groups()
            .flat_map(live_workers)
            .collect();
        for worker in &workers {
            self.dispatch(&mut state, worker).await?;
        }
        self.acquire(&mut state, true).await?;
        Ok(())
    }

    pub async fn mark_test_complete(
        &self,
        worker: &WorkerId,
        index: ItemIndex,
        duration: Duration,
    ) -> Result<(), SessionError> {
        let mut state = self.lock_open().await?;
        let completion = state.router.mark_complete(worker, index)?;
        tracing::debug!(
            %worker,
            index,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "item complete"
        );
        if completion.finished {
            let affinity = state.router.affinity_of(worker)?;
            tracing::info!(%affinity, "affinity group finished");
        }
        self.dispatch(&mut state, worker).await
    }

    /// A worker exited or crashed. Its unfinished items go back to the
    /// front of their scope buckets and whatever it held is released.
    pub async fn remove_node(&self, worker: &WorkerId) -> Result<Vec<ItemIndex>, SessionError> {
        let mut state = self.state.lock().await;
        let affinity = state.router.affinity_of(worker)?.clone();
        let requeued = state.router.remove_worker(worker)?;
        state.shutting_down.remove(worker);
        if !requeued.is_empty() {
            tracing::warn!(%worker, ?requeued, "worker went away with unfinished items");
        }
        match self.host.wait_exit(worker, Duration::ZERO).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(%worker, "worker removed before its process exited"),
            Err(e) => tracing::debug!(%worker, error = %e, "no process to reap"),
        }
        state.poller.release_worker(worker).await?;

        if state.closed || !state.started {
            return Ok(requeued);
        }
        let peers: Vec<WorkerId> = state
            .router
            .group(&affinity)
            .map(live_workers)
            .unwrap_or_default();
        for peer in &peers {
            self.dispatch(&mut state, peer).await?;
        }
        // Freed capacity may unblock other pending work
        self.acquire(&mut state, true).await?;
        Ok(requeued)
    }

    /// Rate-limited poll for meters. Returns the number of workers started.
    pub async fn poll_on_idle(&self) -> Result<usize, SessionError> {
        let mut state = self.lock_open().await?;
        if !state.started {
            return Ok(0);
        }
        self.acquire(&mut state, false).await
    }

    pub async fn has_pending_work(&self) -> bool {
        self.state.lock().await.router.has_pending_work()
    }

    pub async fn tests_finished(&self) -> bool {
        self.state.lock().await.router.tests_finished()
    }

    /// Registered workers, admitted or not
    pub async fn nodes(&self) -> Vec<WorkerId> {
        self.state.lock().await.router.nodes()
    }

    /// Meters this session currently holds, including any whose release
    /// failed and is still owed
    pub async fn held(&self) -> Vec<Address> {
        let state = self.state.lock().await;
        let mut held = state.poller.ledger().addresses();
        held.extend(state.poller.leaked().iter().cloned());
        held.sort();
        held
    }

    /// A registered worker with the meters it holds
    pub async fn worker(&self, id: &WorkerId) -> Option<Worker> {
        let state = self.state.lock().await;
        let affinity = state.router.affinity_of(id).ok()?.clone();
        let ledger = state.poller.ledger();
        let held = ledger
            .addresses()
            .into_iter()
            .filter(|address| ledger.holder_of(address) == Some(id))
            .collect();
        Some(Worker::new(id.clone(), affinity).with_held(held))
    }

    pub async fn phase(&self, category: Category) -> Phase {
        self.state.lock().await.poller.phase(category)
    }

    /// End the session: interrupt remaining workers, give them `exit_grace`
    /// to exit, then release every meter still held. Must be called on every
    /// exit path, including after a fatal error.
    pub async fn close(&self) -> Result<Vec<Address>, SessionError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(Vec::new());
        }
        state.closed = true;
        let workers = state.router.nodes();
        let mut signalled = Vec::new();
        for worker in workers {
            match self.host.terminate(&worker).await {
                Ok(()) => signalled.push(worker),
                Err(e) => tracing::debug!(%worker, error = %e, "worker already gone"),
            }
        }
        // One grace period shared by all workers
        let deadline = tokio::time::Instant::now() + self.exit_grace;
        for worker in &signalled {
            let grace = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.host.wait_exit(worker, grace).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    %worker,
                    grace = ?self.exit_grace,
                    "worker still running, releasing its meters anyway"
                ),
                Err(e) => tracing::debug!(%worker, error = %e, "worker already gone"),
            }
        }
        let released = state.poller.release_all().await?;
        tracing::info!(released = released.len(), "session closed");
        Ok(released)
    }

    /// Top up a live worker to `prefetch` items in flight, or shut it down
    /// once its group has nothing left to hand out.
    async fn dispatch(
        &self,
        state: &mut SessionState<S, C>,
        worker: &WorkerId,
    ) -> Result<(), SessionError> {
        if state.shutting_down.contains(worker) {
            return Ok(());
        }
        let affinity = state.router.affinity_of(worker)?.clone();
        let in_flight = match state.router.group(&affinity) {
            Some(group) if group.is_live(worker) => group.pending_of(worker).len(),
            _ => return Ok(()),
        };

        let mut batch = Vec::new();
        for _ in in_flight..self.prefetch {
            match state.router.next_assignment(worker)? {
                Some(index) => batch.push(index),
                None => break,
            }
        }
        if !batch.is_empty() {
            tracing::debug!(%worker, items = ?batch, "assigning items");
            if let Err(e) = self.host.send_items(worker, &batch).await {
                tracing::warn!(%worker, error = %e, "failed to hand items to worker");
            }
            return Ok(());
        }

        let done = state.router.group(&affinity).is_some_and(|group| {
            group.collection_complete() && group.is_idle(worker) && !group.has_unclaimed_work()
        });
        if done {
            tracing::info!(%worker, %affinity, "no work left, shutting worker down");
            state.shutting_down.insert(worker.clone());
            if let Err(e) = self.host.shutdown(worker).await {
                tracing::warn!(%worker, error = %e, "failed to shut worker down");
            }
        }
        Ok(())
    }

    /// Run one poll cycle against current demand and register the workers
    /// it started
    async fn acquire(
        &self,
        state: &mut SessionState<S, C>,
        immediate: bool,
    ) -> Result<usize, SessionError> {
        let demand = demand(&state.router);
        let spawned = if immediate {
            state.poller.poll_now(&self.host, demand).await?
        } else {
            state.poller.poll(&self.host, demand).await?
        };
        for s in &spawned {
            state.router.register_worker(s.worker.clone(), s.affinity.clone())?;
        }
        Ok(spawned.len())
    }
}

fn demand(router: &AffinityRouter) -> Demand {
    let idle = |affinity: Affinity| {
        router
            .group(&affinity)
            .map_or(0, AffinityGroupQueue::idle_demand)
    };
    Demand {
        single: idle(Affinity::Single),
        multi: idle(Affinity::Multi),
    }
}

fn live_workers(group: &AffinityGroupQueue) -> Vec<WorkerId> {
    group
        .nodes_with_pending()
        .into_iter()
        .filter(|w| group.is_live(w))
        .collect()
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
