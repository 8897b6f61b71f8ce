// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes host events to the group queue matching each worker's affinity

use crate::group::{AffinityGroupQueue, Completion, GroupError};
use crate::work::{Affinity, Classifier, ItemIndex, WorkItem, WorkItemSpec};
use crate::worker::WorkerId;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),
    #[error("worker {worker} collected a different set of items ({got} vs {expected})")]
    CollectionMismatch {
        worker: WorkerId,
        expected: usize,
        got: usize,
    },
    #[error("no item with index {0}")]
    UnknownItem(ItemIndex),
    #[error(transparent)]
    Group(#[from] GroupError),
}

#[derive(Debug)]
pub struct AffinityRouter {
    classifier: Classifier,
    groups: BTreeMap<Affinity, AffinityGroupQueue>,
    workers: BTreeMap<WorkerId, Affinity>,
    collection: Option<Vec<WorkItem>>,
}

impl AffinityRouter {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            groups: BTreeMap::new(),
            workers: BTreeMap::new(),
            collection: None,
        }
    }

    fn group_mut(&mut self, affinity: &Affinity) -> &mut AffinityGroupQueue {
        let loaded = self.collection.is_some();
        self.groups.entry(affinity.clone()).or_insert_with(|| {
            let mut group = AffinityGroupQueue::new(affinity.clone());
            // Collection already partitioned and this affinity had no items
            if loaded {
                group.load(std::iter::empty());
            }
            group
        })
    }

    pub fn register_worker(&mut self, worker: WorkerId, affinity: Affinity) -> Result<(), RouterError> {
        if self.workers.contains_key(&worker) {
            return Err(RouterError::DuplicateWorker(worker));
        }
        self.group_mut(&affinity).add_worker(worker.clone())?;
        tracing::debug!(%worker, %affinity, "worker registered");
        self.workers.insert(worker, affinity);
        Ok(())
    }

    /// A worker finished collecting. The first report partitions the
    /// collection; later ones must agree with it. Returns true when the
    /// worker was newly admitted.
    pub fn on_collection_ready(
        &mut self,
        worker: &WorkerId,
        items: &[WorkItemSpec],
    ) -> Result<bool, RouterError> {
        let affinity = self
            .workers
            .get(worker)
            .cloned()
            .ok_or_else(|| RouterError::UnknownWorker(worker.clone()))?;

        match &self.collection {
            Some(existing) => {
                let same = existing.len() == items.len()
                    && existing.iter().zip(items).all(|(a, b)| a.node_id == b.node_id);
                if !same {
                    return Err(RouterError::CollectionMismatch {
                        worker: worker.clone(),
                        expected: existing.len(),
                        got: items.len(),
                    });
                }
            }
            None => self.partition(items),
        }

        Ok(self.group_mut(&affinity).admit(worker)?)
    }

    fn partition(&mut self, specs: &[WorkItemSpec]) {
        let items: Vec<WorkItem> = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let (affinity, scope) = self.classifier.classify(spec);
                WorkItem {
                    index,
                    node_id: spec.node_id.clone(),
                    affinity,
                    scope,
                    completed: false,
                }
            })
            .collect();

        let mut by_affinity: BTreeMap<Affinity, Vec<_>> = BTreeMap::new();
        for item in &items {
            by_affinity
                .entry(item.affinity.clone())
                .or_default()
                .push((item.index, item.scope.clone()));
        }
        for group in self.groups.values_mut() {
            if !by_affinity.contains_key(group.affinity()) {
                group.load(std::iter::empty());
            }
        }
        for (affinity, members) in by_affinity {
            tracing::info!(%affinity, items = members.len(), "affinity group loaded");
            self.groups
                .entry(affinity.clone())
                .or_insert_with(|| AffinityGroupQueue::new(affinity))
                .load(members);
        }
        self.collection = Some(items);
    }

    pub fn next_assignment(&mut self, worker: &WorkerId) -> Result<Option<ItemIndex>, RouterError> {
        let affinity = self.affinity_of(worker)?.clone();
        Ok(self.group_mut(&affinity).next_assignment(worker))
    }

    pub fn mark_complete(
        &mut self,
        worker: &WorkerId,
        index: ItemIndex,
    ) -> Result<Completion, RouterError> {
        let affinity = self.affinity_of(worker)?.clone();
        let item = self.item(index).ok_or(RouterError::UnknownItem(index))?;
        if item.affinity != affinity {
            return Err(GroupError::NotAssigned {
                worker: worker.clone(),
                index,
            }
            .into());
        }
        let completion = self.group_mut(&affinity).mark_complete(worker, index)?;
        if let Some(item) = self.collection.as_mut().and_then(|c| c.get_mut(index)) {
            item.completed = true;
        }
        Ok(completion)
    }

    /// Deregister a worker and requeue its unfinished items
    pub fn remove_worker(&mut self, worker: &WorkerId) -> Result<Vec<ItemIndex>, RouterError> {
        let affinity = self
            .workers
            .remove(worker)
            .ok_or_else(|| RouterError::UnknownWorker(worker.clone()))?;
        let requeued = self.group_mut(&affinity).remove_worker(worker)?;
        if !requeued.is_empty() {
            tracing::info!(%worker, %affinity, ?requeued, "requeued unfinished items");
        }
        Ok(requeued)
    }

    pub fn affinity_of(&self, worker: &WorkerId) -> Result<&Affinity, RouterError> {
        self.workers
            .get(worker)
            .ok_or_else(|| RouterError::UnknownWorker(worker.clone()))
    }

    pub fn group(&self, affinity: &Affinity) -> Option<&AffinityGroupQueue> {
        self.groups.get(affinity)
    }

    pub fn groups(&self) -> impl Iterator<Item = &AffinityGroupQueue> {
        self.groups.values()
    }

    pub fn item(&self, index: ItemIndex) -> Option<&WorkItem> {
        self.collection.as_ref().and_then(|c| c.get(index))
    }

    pub fn collection_loaded(&self) -> bool {
        self.collection.is_some()
    }

    /// Every registered worker, pending or live, across all groups
    pub fn nodes(&self) -> Vec<WorkerId> {
        self.groups
            .values()
            .flat_map(AffinityGroupQueue::nodes_with_pending)
            .collect()
    }

    pub fn has_pending_work(&self) -> bool {
        self.groups.values().any(AffinityGroupQueue::has_pending_work)
    }

    pub fn tests_finished(&self) -> bool {
        self.collection.is_some() && self.groups.values().all(AffinityGroupQueue::tests_finished)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
