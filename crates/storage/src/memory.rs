// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory lock store for tests
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::store::{LockStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use ms_core::{Address, Resource, ResourceFilter};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    TryLock { address: Address, holder: String },
    Unlock { address: Address },
    List,
    Get { address: Address },
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<Address, Resource>,
    faults: VecDeque<StoreError>,
    /// Next try_lock on these addresses loses a race
    contended: Vec<Address>,
    calls: Vec<StoreCall>,
}

/// Lock store backed by a map, with call recording and fault injection
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let store = Self::new();
        for r in resources {
            store.insert(r);
        }
        store
    }

    pub fn insert(&self, resource: Resource) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .insert(resource.address.clone(), resource);
    }

    /// Mark a meter busy on behalf of some other session
    pub fn mark_busy(&self, address: &Address, host: &str) {
        if let Some(row) = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .get_mut(address)
        {
            row.busy = true;
            row.owner_host = Some(host.to_string());
        }
    }

    /// Free a meter as if its other holder let go
    pub fn mark_free(&self, address: &Address) {
        if let Some(row) = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .get_mut(address)
        {
            row.busy = false;
            row.owner_host = None;
        }
    }

    /// The next call, whatever it is, fails with `error`
    pub fn fail_next(&self, error: StoreError) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .faults
            .push_back(error);
    }

    /// The next `try_lock` of `address` returns false as if another process won
    pub fn lose_next_lock(&self, address: &Address) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contended
            .push(address.clone());
    }

    pub fn resource(&self, address: &Address) -> Option<Resource> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .get(address)
            .cloned()
    }

    pub fn busy_addresses(&self) -> Vec<Address> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .values()
            .filter(|r| r.busy)
            .map(|r| r.address.clone())
            .collect()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    pub fn unlock_calls(&self, address: &Address) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Unlock { address: a } if a == address))
            .count()
    }

    pub fn lock_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::TryLock { .. }))
            .count()
    }

    fn begin(&self, call: StoreCall) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(call);
        match state.faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        let mut state = self.begin(StoreCall::TryLock {
            address: address.clone(),
            holder: holder.to_string(),
        })?;
        if let Some(pos) = state.contended.iter().position(|a| a == address) {
            state.contended.remove(pos);
            return Ok(false);
        }
        let row = state
            .rows
            .get_mut(address)
            .ok_or_else(|| StoreError::UnknownResource(address.clone()))?;
        if row.busy {
            return Ok(false);
        }
        row.busy = true;
        row.owner_host = Some(holder.to_string());
        row.busy_change_count += 1;
        row.last_busy_change = Some(Utc::now());
        Ok(true)
    }

    async fn unlock(&self, address: &Address) -> Result<(), StoreError> {
        let mut state = self.begin(StoreCall::Unlock {
            address: address.clone(),
        })?;
        let row = state
            .rows
            .get_mut(address)
            .ok_or_else(|| StoreError::UnknownResource(address.clone()))?;
        if !row.busy {
            return Err(StoreError::NotLocked(address.clone()));
        }
        row.busy = false;
        row.owner_host = None;
        row.last_busy_change = Some(Utc::now());
        Ok(())
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let state = self.begin(StoreCall::List)?;
        Ok(state
            .rows
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError> {
        let state = self.begin(StoreCall::Get {
            address: address.clone(),
        })?;
        Ok(state.rows.get(address).cloned())
    }
}
