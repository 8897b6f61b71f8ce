// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker host adapters
//!
//! The host framework owns worker processes. The scheduler only asks it to
//! start one with a given environment, feed it items, stop it, and wait
//! for it to go away.

mod process;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use process::{ProcessHost, WorkerMessage};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHost, HostCall};

use async_trait::async_trait;
use ms_core::{ItemIndex, WorkerEnv, WorkerId};
use std::time::Duration;
use thiserror::Error;

/// Errors from worker host operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("failed to start worker: {0}")]
    SpawnFailed(String),
    #[error("worker not found: {0}")]
    NotFound(WorkerId),
    #[error("failed to reach worker {worker}: {message}")]
    SendFailed { worker: WorkerId, message: String },
}

/// Adapter for starting and driving worker processes
#[async_trait]
pub trait WorkerHost: Clone + Send + Sync + 'static {
    /// Start a worker with the given environment
    async fn spawn(&self, env: &WorkerEnv) -> Result<WorkerId, HostError>;

    /// Hand items to a running worker
    async fn send_items(&self, worker: &WorkerId, items: &[ItemIndex]) -> Result<(), HostError>;

    /// Let the worker finish what it has and exit
    async fn shutdown(&self, worker: &WorkerId) -> Result<(), HostError>;

    /// Interrupt the worker now
    async fn terminate(&self, worker: &WorkerId) -> Result<(), HostError>;

    /// Wait up to `grace` for the worker to exit and forget it once it has.
    /// Returns false if it is still running when `grace` runs out.
    async fn wait_exit(&self, worker: &WorkerId, grace: Duration) -> Result<bool, HostError>;
}
