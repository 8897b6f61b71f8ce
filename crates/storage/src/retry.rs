// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-backoff retries around a lock store
//!
//! Transient errors and per-call timeouts are retried; anything else is
//! returned at once. Exhausted retries become `StoreError::Unreachable`.
//!
//! A `try_lock` that timed out or failed may still have committed, so every
//! retry first reads the row back and counts it as acquired when it is
//! already busy under the same holder.

use crate::store::{LockStore, StoreError};
use async_trait::async_trait;
use ms_core::{Address, Resource, ResourceFilter, RetryConfig};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub call_timeout: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            backoff: config.backoff,
            call_timeout: config.call_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[derive(Clone)]
pub struct RetryingLockStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: LockStore> RetryingLockStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Whether the row is busy under `holder`
    async fn owned_by(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .get(address)
            .await?
            .is_some_and(|row| row.busy && row.owner_host.as_deref() == Some(holder)))
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let attempts = self.policy.attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() => last = e.to_string(),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    last = format!(
                        "no response within {}ms",
                        self.policy.call_timeout.as_millis()
                    )
                }
            }
            if attempt < attempts {
                tracing::warn!(
                    operation,
                    attempt,
                    attempts,
                    error = %last,
                    backoff_ms = self.policy.backoff.as_millis() as u64,
                    "storage call failed, retrying"
                );
                tokio::time::sleep(self.policy.backoff).await;
            }
        }
        tracing::error!(operation, attempts, error = %last, "storage retries exhausted");
        Err(StoreError::Unreachable {
            operation: operation.to_string(),
            attempts,
            message: last,
        })
    }
}

#[async_trait]
impl<S: LockStore> LockStore for RetryingLockStore<S> {
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        let attempted = AtomicBool::new(false);
        let attempted = &attempted;
        let result = self
            .run("try_lock", || async move {
                if attempted.swap(true, Ordering::SeqCst) && self.owned_by(address, holder).await? {
                    tracing::warn!(%address, holder, "earlier lock attempt had committed");
                    return Ok(true);
                }
                self.inner.try_lock(address, holder).await
            })
            .await;
        match result {
            Err(e @ StoreError::Unreachable { .. }) => {
                // The last attempt may have committed too
                match tokio::time::timeout(self.policy.call_timeout, self.owned_by(address, holder))
                    .await
                {
                    Ok(Ok(true)) => Ok(true),
                    _ => Err(e),
                }
            }
            other => other,
        }
    }

    async fn unlock(&self, address: &Address) -> Result<(), StoreError> {
        self.run("unlock", || self.inner.unlock(address)).await
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        self.run("list_resources", || self.inner.list_resources(filter))
            .await
    }

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError> {
        self.run("get", || self.inner.get(address)).await
    }
}
