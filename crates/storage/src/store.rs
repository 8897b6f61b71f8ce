// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock store trait

use async_trait::async_trait;
use ms_core::{Address, Resource, ResourceFilter};
use thiserror::Error;

/// Errors from lock store operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Unlock of a row whose busy flag was already clear
    #[error("{0} is not locked")]
    NotLocked(Address),
    #[error("no meter with address {0}")]
    UnknownResource(Address),
    /// Worth retrying: contention or a dropped connection
    #[error("transient storage error: {0}")]
    Transient(String),
    /// Retries exhausted
    #[error("storage unreachable: {operation} failed after {attempts} attempts: {message}")]
    Unreachable {
        operation: String,
        attempts: u32,
        message: String,
    },
    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// A table of meters with per-row conditional locking.
///
/// `try_lock` must be a single conditional update so that concurrent
/// callers in other processes race safely at the storage layer.
#[async_trait]
pub trait LockStore: Clone + Send + Sync + 'static {
    /// Mark a free meter busy. Returns false when it was already busy.
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError>;

    /// Clear the busy flag; fails with `NotLocked` if it was already clear
    async fn unlock(&self, address: &Address) -> Result<(), StoreError>;

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError>;

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError>;
}
