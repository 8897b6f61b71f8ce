// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-affinity work queue
//!
//! Items are kept in scope buckets in first-seen order. A worker claims a
//! whole bucket at a time so that items sharing a scope run consecutively
//! on the same worker. Every item lives in exactly one place: an unclaimed
//! bucket, a worker's claimed bucket, a worker's assigned set, or the
//! completed set.

use crate::work::{Affinity, ItemIndex, Scope};
use crate::worker::WorkerId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("worker {0} is not registered with this group")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),
    #[error("item {index} is not assigned to worker {worker}")]
    NotAssigned { worker: WorkerId, index: ItemIndex },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScopeBucket {
    scope: Scope,
    items: VecDeque<ItemIndex>,
}

#[derive(Debug, Clone, Default)]
struct WorkerClaim {
    /// Remainder of the scope bucket this worker has claimed
    open: Option<ScopeBucket>,
    /// Handed out, not yet completed
    assigned: BTreeMap<ItemIndex, Scope>,
}

impl WorkerClaim {
    fn is_idle(&self) -> bool {
        self.assigned.is_empty() && self.open.as_ref().is_none_or(|b| b.items.is_empty())
    }
}

/// Outcome of [`AffinityGroupQueue::mark_complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The worker has nothing assigned or claimed anymore
    pub worker_idle: bool,
    /// Every item of the group has completed
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct AffinityGroupQueue {
    affinity: Affinity,
    buckets: VecDeque<ScopeBucket>,
    /// Registered but not yet admitted
    pending: Vec<WorkerId>,
    live: Vec<WorkerId>,
    claims: BTreeMap<WorkerId, WorkerClaim>,
    completed: BTreeSet<ItemIndex>,
    collection_complete: bool,
}

impl AffinityGroupQueue {
    pub fn new(affinity: Affinity) -> Self {
        Self {
            affinity,
            buckets: VecDeque::new(),
            pending: Vec::new(),
            live: Vec::new(),
            claims: BTreeMap::new(),
            completed: BTreeSet::new(),
            collection_complete: false,
        }
    }

    pub fn affinity(&self) -> &Affinity {
        &self.affinity
    }

    /// Load the group's share of the collection, in discovery order
    pub fn load(&mut self, items: impl IntoIterator<Item = (ItemIndex, Scope)>) {
        for (index, scope) in items {
            match self.buckets.iter_mut().find(|b| b.scope == scope) {
                Some(bucket) => bucket.items.push_back(index),
                None => self.buckets.push_back(ScopeBucket {
                    scope,
                    items: VecDeque::from([index]),
                }),
            }
        }
        self.collection_complete = true;
    }

    pub fn collection_complete(&self) -> bool {
        self.collection_complete
    }

    /// Register a worker; it sees no work until [`admit`](Self::admit)
    pub fn add_worker(&mut self, worker: WorkerId) -> Result<(), GroupError> {
        if self.contains(&worker) {
            return Err(GroupError::DuplicateWorker(worker));
        }
        self.pending.push(worker);
        Ok(())
    }

    /// Promote a pending worker to live. Returns false if it was already live.
    pub fn admit(&mut self, worker: &WorkerId) -> Result<bool, GroupError> {
        if self.live.contains(worker) {
            return Ok(false);
        }
        let pos = self
            .pending
            .iter()
            .position(|w| w == worker)
            .ok_or_else(|| GroupError::UnknownWorker(worker.clone()))?;
        let worker = self.pending.remove(pos);
        self.claims.insert(worker.clone(), WorkerClaim::default());
        self.live.push(worker);
        Ok(true)
    }

    pub fn contains(&self, worker: &WorkerId) -> bool {
        self.live.contains(worker) || self.pending.contains(worker)
    }

    pub fn is_live(&self, worker: &WorkerId) -> bool {
        self.live.contains(worker)
    }

    /// Next item for a live worker, continuing its claimed scope first
    pub fn next_assignment(&mut self, worker: &WorkerId) -> Option<ItemIndex> {
        let claim = self.claims.get_mut(worker)?;
        let has_open = claim.open.as_ref().is_some_and(|b| !b.items.is_empty());
        if !has_open {
            claim.open = self.buckets.pop_front();
        }
        let bucket = claim.open.as_mut()?;
        let index = bucket.items.pop_front()?;
        claim.assigned.insert(index, bucket.scope.clone());
        Some(index)
    }

    pub fn mark_complete(
        &mut self,
        worker: &WorkerId,
        index: ItemIndex,
    ) -> Result<Completion, GroupError> {
        let claim = self
            .claims
            .get_mut(worker)
            .ok_or_else(|| GroupError::UnknownWorker(worker.clone()))?;
        if claim.assigned.remove(&index).is_none() {
            return Err(GroupError::NotAssigned {
                worker: worker.clone(),
                index,
            });
        }
        let worker_idle = claim.is_idle();
        self.completed.insert(index);
        Ok(Completion {
            worker_idle,
            finished: self.tests_finished(),
        })
    }

    /// Drop a worker, returning its unfinished items to the front of their
    /// scope buckets. Returns the requeued indexes.
    pub fn remove_worker(&mut self, worker: &WorkerId) -> Result<Vec<ItemIndex>, GroupError> {
        if let Some(pos) = self.pending.iter().position(|w| w == worker) {
            self.pending.remove(pos);
            return Ok(Vec::new());
        }
        let pos = self
            .live
            .iter()
            .position(|w| w == worker)
            .ok_or_else(|| GroupError::UnknownWorker(worker.clone()))?;
        self.live.remove(pos);
        let Some(claim) = self.claims.remove(worker) else {
            return Ok(Vec::new());
        };

        let mut requeued = Vec::new();
        if let Some(open) = claim.open {
            for index in open.items.into_iter().rev() {
                self.push_front(open.scope.clone(), index);
            }
        }
        // Assigned items go in front of the unclaimed remainder
        for (index, scope) in claim.assigned.into_iter().rev() {
            self.push_front(scope, index);
            requeued.push(index);
        }
        requeued.reverse();
        Ok(requeued)
    }

    fn push_front(&mut self, scope: Scope, index: ItemIndex) {
        match self.buckets.iter().position(|b| b.scope == scope) {
            Some(pos) => {
                if let Some(mut bucket) = self.buckets.remove(pos) {
                    bucket.items.push_front(index);
                    self.buckets.push_front(bucket);
                }
            }
            None => self.buckets.push_front(ScopeBucket {
                scope,
                items: VecDeque::from([index]),
            }),
        }
    }

    /// Items handed to a worker and not yet completed
    pub fn pending_of(&self, worker: &WorkerId) -> Vec<ItemIndex> {
        self.claims
            .get(worker)
            .map(|c| c.assigned.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the worker has nothing assigned and nothing left in its claim
    pub fn is_idle(&self, worker: &WorkerId) -> bool {
        self.claims.get(worker).is_none_or(WorkerClaim::is_idle)
    }

    /// Scope buckets no worker has claimed yet
    pub fn unclaimed_scopes(&self) -> usize {
        self.buckets.len()
    }

    pub fn has_unclaimed_work(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Unclaimed buckets beyond what already-registered idle workers will take
    pub fn idle_demand(&self) -> usize {
        let idle = self.pending.len()
            + self
                .claims
                .values()
                .filter(|c| c.open.as_ref().is_none_or(|b| b.items.is_empty()))
                .count();
        self.buckets.len().saturating_sub(idle)
    }

    /// Any item not yet completed, whether queued or in flight
    pub fn has_pending_work(&self) -> bool {
        !self.buckets.is_empty() || self.claims.values().any(|c| !c.is_idle())
    }

    pub fn tests_finished(&self) -> bool {
        self.collection_complete && !self.has_pending_work()
    }

    /// Live and pending-admission workers
    pub fn nodes_with_pending(&self) -> Vec<WorkerId> {
        self.live.iter().chain(self.pending.iter()).cloned().collect()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
