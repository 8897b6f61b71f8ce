// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock store wrapper that remembers what went through it
//!
//! The broker owns the single connection that many workers share. It keeps
//! the set of addresses it locked, mirrors that set to the side file after
//! each change, and can release everything on shutdown.

use crate::snapshot::LockSnapshot;
use crate::store::{LockStore, StoreError};
use async_trait::async_trait;
use ms_core::{Address, Resource, ResourceFilter};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct LockBroker<S> {
    store: S,
    held: Arc<Mutex<BTreeSet<Address>>>,
    snapshot: Option<LockSnapshot>,
}

impl<S: LockStore> LockBroker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            held: Arc::new(Mutex::new(BTreeSet::new())),
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: LockSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Addresses locked through this broker and not yet unlocked
    pub fn held(&self) -> Vec<Address> {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn update(&self, change: impl FnOnce(&mut BTreeSet<Address>)) {
        let held = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            change(&mut held);
            held.iter().cloned().collect::<Vec<_>>()
        };
        if let Some(snapshot) = &self.snapshot {
            snapshot.record(&held);
        }
    }

    /// Unlock everything still held. Returns the addresses that could not
    /// be released.
    pub async fn release_all(&self) -> Vec<(Address, StoreError)> {
        let mut failed = Vec::new();
        for address in self.held() {
            match self.unlock(&address).await {
                Ok(()) => tracing::info!(%address, "released"),
                Err(StoreError::NotLocked(_)) => {
                    tracing::warn!(%address, "already free at release");
                    self.update(|held| {
                        held.remove(&address);
                    });
                }
                Err(e) => {
                    tracing::error!(%address, error = %e, "release failed");
                    failed.push((address, e));
                }
            }
        }
        failed
    }
}

#[async_trait]
impl<S: LockStore> LockStore for LockBroker<S> {
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        let acquired = self.store.try_lock(address, holder).await?;
        if acquired {
            self.update(|held| {
                held.insert(address.clone());
            });
        }
        Ok(acquired)
    }

    async fn unlock(&self, address: &Address) -> Result<(), StoreError> {
        self.store.unlock(address).await?;
        self.update(|held| {
            held.remove(address);
        });
        Ok(())
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        self.store.list_resources(filter).await
    }

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError> {
        self.store.get(address).await
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
