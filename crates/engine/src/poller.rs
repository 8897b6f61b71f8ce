// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meter acquisition for pending meter-bound work
//!
//! Each poll cycle greedily locks free meters (or whole peer groups) up to
//! the configured ceiling and starts one worker per acquisition. Every
//! meter the session holds is recorded in the ledger and released exactly
//! once, when its worker goes away or the session closes.

use crate::error::{Category, SessionError};
use ms_adapters::WorkerHost;
use ms_core::{
    group_by_peer, Address, Affinity, Clock, Deadline, HeldLockLedger, Holding, PeerFilter,
    PeerGroup, ResourceFilter, ResourceGroup, SchedulerConfig, WorkerEnv, WorkerId,
};
use ms_storage::{LockStore, StoreError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Lifecycle of one meter category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No demand seen yet
    Idle,
    /// Demand exists and nothing in this category is held
    AwaitingLock,
    /// At least one meter of this category is held
    Running,
    /// Everything this category held has been released
    Released,
}

/// Workers that could start right now, per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand {
    pub single: usize,
    pub multi: usize,
}

impl Demand {
    pub fn is_empty(&self) -> bool {
        self.single == 0 && self.multi == 0
    }
}

/// A worker started on freshly locked meters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawned {
    pub worker: WorkerId,
    pub affinity: Affinity,
    pub meters: Vec<Address>,
}

#[derive(Debug)]
struct CategoryState {
    phase: Phase,
    deadline: Deadline,
    next_notice: Option<Instant>,
}

impl CategoryState {
    fn new(deadline: Deadline) -> Self {
        Self {
            phase: Phase::Idle,
            deadline,
            next_notice: None,
        }
    }
}

pub struct ResourcePoller<S, C> {
    store: S,
    clock: C,
    holder: String,
    max_resources: usize,
    poll_interval: Duration,
    notice_interval: Duration,
    group_retry_limit: Option<u32>,
    allow_list: Vec<Address>,
    lock_socket: Option<PathBuf>,
    ledger: HeldLockLedger,
    /// Meters dropped from the ledger whose unlock failed
    leaked: Vec<Address>,
    single: CategoryState,
    multi: CategoryState,
    next_poll: Option<Instant>,
    /// Rollbacks since the last successful group lock
    group_rollbacks: u32,
    warned_groups: BTreeSet<PeerGroup>,
}

impl<S: LockStore, C: Clock> ResourcePoller<S, C> {
    /// Lock-wait deadlines start counting now
    pub fn new(store: S, clock: C, config: &SchedulerConfig) -> Self {
        let deadline = Deadline::after(&clock, config.lock_timeout);
        Self {
            store,
            holder: config.holder_host(),
            max_resources: config.max_resources,
            poll_interval: config.poll_interval,
            notice_interval: config.notice_interval,
            group_retry_limit: config.group_retry_limit,
            allow_list: config.meters.clone(),
            lock_socket: config.lock_socket.clone(),
            ledger: HeldLockLedger::new(),
            leaked: Vec::new(),
            single: CategoryState::new(deadline),
            multi: CategoryState::new(deadline),
            next_poll: None,
            group_rollbacks: 0,
            warned_groups: BTreeSet::new(),
            clock,
        }
    }

    pub fn ledger(&self) -> &HeldLockLedger {
        &self.ledger
    }

    /// Meters a failed release left locked; `release_all` retries them
    pub fn leaked(&self) -> &[Address] {
        &self.leaked
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn phase(&self, category: Category) -> Phase {
        match category {
            Category::Single => self.single.phase,
            Category::Multi => self.multi.phase,
        }
    }

    /// Poll unless the last cycle was less than `poll_interval` ago
    pub async fn poll<H: WorkerHost>(
        &mut self,
        host: &H,
        demand: Demand,
    ) -> Result<Vec<Spawned>, SessionError> {
        let now = self.clock.now();
        if self.next_poll.is_some_and(|next| now < next) {
            return Ok(Vec::new());
        }
        self.poll_now(host, demand).await
    }

    /// Poll immediately, e.g. after a release freed capacity
    pub async fn poll_now<H: WorkerHost>(
        &mut self,
        host: &H,
        demand: Demand,
    ) -> Result<Vec<Spawned>, SessionError> {
        if demand.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        self.next_poll = Some(now + self.poll_interval);

        let mut spawned = Vec::new();
        if demand.single > 0 {
            self.poll_singles(host, demand.single, &mut spawned).await?;
        }
        if demand.multi > 0 {
            self.poll_groups(host, demand.multi, &mut spawned).await?;
        }
        Ok(spawned)
    }

    fn candidate_filter(&self, peer: PeerFilter) -> ResourceFilter {
        ResourceFilter::active()
            .with_peer(peer)
            .with_addresses(self.allow_list.clone())
    }

    async fn poll_singles<H: WorkerHost>(
        &mut self,
        host: &H,
        want: usize,
        spawned: &mut Vec<Spawned>,
    ) -> Result<(), SessionError> {
        let candidates = self
            .store
            .list_resources(&self.candidate_filter(PeerFilter::Ungrouped))
            .await?;
        if candidates.is_empty() && self.ledger.single_count() == 0 {
            return Err(SessionError::NoResources {
                category: Category::Single,
            });
        }

        let mut acquired = 0;
        let mut attempted = false;
        for resource in candidates.into_iter().filter(|r| !r.busy) {
            if acquired >= want || self.ledger.total_held() >= self.max_resources {
                break;
            }
            if self.ledger.is_held(&resource.address) {
                continue;
            }
            attempted = true;
            let address = resource.address;
            if !self.store.try_lock(&address, &self.holder).await? {
                tracing::debug!(%address, "meter taken by another session");
                continue;
            }

            let env = WorkerEnv::single(address.clone()).with_lock_socket(self.lock_socket.clone());
            match host.spawn(&env).await {
                Ok(worker) => {
                    self.ledger.record_single(address.clone(), worker.clone())?;
                    tracing::info!(%address, %worker, held = self.ledger.total_held(), "meter locked");
                    spawned.push(Spawned {
                        worker,
                        affinity: Affinity::Single,
                        meters: vec![address],
                    });
                    acquired += 1;
                }
                Err(e) => {
                    tracing::error!(%address, error = %e, "worker failed to start, releasing meter");
                    self.store.unlock(&address).await?;
                    break;
                }
            }
        }

        let at_ceiling = self.ledger.total_held() >= self.max_resources;
        self.settle(Category::Single, acquired, attempted || !at_ceiling)
    }

    async fn poll_groups<H: WorkerHost>(
        &mut self,
        host: &H,
        want: usize,
        spawned: &mut Vec<Spawned>,
    ) -> Result<(), SessionError> {
        let resources = self
            .store
            .list_resources(&self.candidate_filter(PeerFilter::Grouped))
            .await?;
        let (groups, rejected) = group_by_peer(&resources);
        for group in rejected {
            if self.warned_groups.insert(group.name.clone()) {
                tracing::warn!(group = %group.name, "peer group has a single member, ignored");
            }
        }
        for group in groups.iter().filter(|g| g.len() > self.max_resources) {
            if self.warned_groups.insert(group.name.clone()) {
                tracing::warn!(
                    group = %group.name,
                    size = group.len(),
                    max = self.max_resources,
                    "peer group larger than the meter ceiling can never be scheduled"
                );
            }
        }
        if groups.is_empty() && self.ledger.group_count() == 0 {
            return Err(SessionError::NoResources {
                category: Category::Multi,
            });
        }

        let busy: BTreeSet<&Address> = resources
            .iter()
            .filter(|r| r.busy)
            .map(|r| &r.address)
            .collect();

        let mut acquired = 0;
        let mut attempted = false;
        let mut blocked_by_ceiling = false;
        for group in &groups {
            if acquired >= want {
                break;
            }
            if self.ledger.holds_group(&group.name) {
                continue;
            }
            if self.ledger.total_held() + group.len() > self.max_resources {
                blocked_by_ceiling = true;
                continue;
            }
            // A group is only tried when every member looked free
            if group.members.iter().any(|m| busy.contains(m)) {
                attempted = true;
                continue;
            }
            attempted = true;
            if !self.lock_group(group).await? {
                self.group_rollbacks += 1;
                if let Some(limit) = self.group_retry_limit {
                    if self.group_rollbacks > limit && self.ledger.group_count() == 0 {
                        return Err(SessionError::GroupRetriesExhausted {
                            attempts: self.group_rollbacks,
                        });
                    }
                }
                continue;
            }
            self.group_rollbacks = 0;

            let env = WorkerEnv::multi(group.members.clone())
                .with_lock_socket(self.lock_socket.clone());
            match host.spawn(&env).await {
                Ok(worker) => {
                    self.ledger.record_group(group, worker.clone())?;
                    tracing::info!(group = %group.name, %worker, held = self.ledger.total_held(), "peer group locked");
                    spawned.push(Spawned {
                        worker,
                        affinity: Affinity::Multi,
                        meters: group.members.clone(),
                    });
                    acquired += 1;
                }
                Err(e) => {
                    tracing::error!(group = %group.name, error = %e, "worker failed to start, releasing group");
                    self.unlock_all(&group.members).await?;
                    break;
                }
            }
        }

        self.settle(Category::Multi, acquired, attempted || !blocked_by_ceiling)
    }

    /// Lock every member or none. Returns false after rolling back.
    async fn lock_group(&mut self, group: &ResourceGroup) -> Result<bool, SessionError> {
        let mut locked = Vec::with_capacity(group.len());
        for member in &group.members {
            match self.store.try_lock(member, &self.holder).await {
                Ok(true) => locked.push(member.clone()),
                Ok(false) => {
                    tracing::info!(group = %group.name, %member, rolled_back = locked.len(), "peer group partially locked, rolling back");
                    self.unlock_all(&locked).await?;
                    return Ok(false);
                }
                Err(e) => {
                    self.unlock_all(&locked).await?;
                    return Err(e.into());
                }
            }
        }
        Ok(true)
    }

    async fn unlock_all(&self, addresses: &[Address]) -> Result<(), SessionError> {
        let mut first_err = None;
        for address in addresses {
            if let Err(e) = self.store.unlock(address).await {
                tracing::error!(%address, error = %e, "unlock failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Update the category phase and enforce the lock-wait deadline
    fn settle(&mut self, category: Category, acquired: usize, tried: bool) -> Result<(), SessionError> {
        let held = match category {
            Category::Single => self.ledger.single_count(),
            Category::Multi => self.ledger.multi_count(),
        };
        let now = self.clock.now();
        let notice_interval = self.notice_interval;
        let state = match category {
            Category::Single => &mut self.single,
            Category::Multi => &mut self.multi,
        };

        if acquired > 0 || held > 0 {
            state.phase = Phase::Running;
            return Ok(());
        }
        state.phase = Phase::AwaitingLock;
        if !tried {
            return Ok(());
        }
        if state.deadline.is_expired(now) {
            tracing::error!(%category, "meter lock timeout");
            return Err(SessionError::LockTimeout {
                category,
                waited: state.deadline.budget(),
            });
        }
        if state.next_notice.is_none_or(|next| now >= next) {
            tracing::info!(
                %category,
                remaining_secs = state.deadline.remaining(now).as_secs(),
                "waiting for meter lock"
            );
            state.next_notice = Some(now + notice_interval);
        }
        Ok(())
    }

    /// Release whatever the worker held. Safe to call for workers that hold
    /// nothing. Every meter is attempted; those that fail to unlock are kept
    /// for `release_all` and the first failure is returned.
    pub async fn release_worker(&mut self, worker: &WorkerId) -> Result<Option<Holding>, SessionError> {
        let Some(holding) = self.ledger.release_worker(worker)? else {
            return Ok(None);
        };
        let mut first_err: Option<SessionError> = None;
        for address in holding.addresses() {
            match self.store.unlock(&address).await {
                Ok(()) => tracing::info!(%address, %worker, "meter released"),
                Err(StoreError::NotLocked(_)) => {
                    tracing::warn!(%address, %worker, "meter was already free at release")
                }
                Err(e) => {
                    tracing::error!(%address, %worker, error = %e, "failed to release meter");
                    self.leaked.push(address);
                    first_err.get_or_insert(e.into());
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                self.mark_released();
                Ok(Some(holding))
            }
        }
    }

    fn mark_released(&mut self) {
        if self.single.phase == Phase::Running && self.ledger.single_count() == 0 {
            self.single.phase = Phase::Released;
        }
        if self.multi.phase == Phase::Running && self.ledger.multi_count() == 0 {
            self.multi.phase = Phase::Released;
        }
    }

    /// Drain the ledger and the leaked list, and unlock every row they name
    /// that the store still shows as held by this host. Every entry is
    /// attempted; failures stay leaked and the first one is returned.
    pub async fn release_all(&mut self) -> Result<Vec<Address>, SessionError> {
        let mut released = Vec::new();
        let mut first_err: Option<SessionError> = None;

        let mut addresses: Vec<Address> = self
            .ledger
            .drain()
            .into_iter()
            .flat_map(|holding| holding.addresses())
            .collect();
        addresses.append(&mut self.leaked);

        for address in addresses {
            match self.store.get(&address).await {
                Ok(Some(row)) if !row.busy => {
                    tracing::warn!(%address, "ledger entry already free in store");
                    continue;
                }
                Ok(Some(row)) if row.owner_host.as_deref() != Some(self.holder.as_str()) => {
                    tracing::warn!(%address, owner = ?row.owner_host, "meter now held by another host, leaving it");
                    continue;
                }
                Ok(None) => {
                    tracing::warn!(%address, "ledger entry missing from store");
                    continue;
                }
                // Unlock anyway when the row cannot be read
                Ok(Some(_)) | Err(_) => {}
            }
            match self.store.unlock(&address).await {
                Ok(()) => {
                    tracing::info!(%address, "meter released at shutdown");
                    released.push(address);
                }
                Err(StoreError::NotLocked(_)) => {}
                Err(e) => {
                    tracing::error!(%address, error = %e, "failed to release meter at shutdown");
                    self.leaked.push(address);
                    first_err.get_or_insert(e.into());
                }
            }
        }
        self.mark_released();
        match first_err {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
