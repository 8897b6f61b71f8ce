// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::host::{HostError, WorkerHost};
use async_trait::async_trait;
use ms_core::{ItemIndex, WorkerEnv, WorkerId};
use std::time::Duration;

/// Wrapper that adds tracing to any WorkerHost
#[derive(Clone)]
pub struct TracedHost<H> {
    inner: H,
}

impl<H> TracedHost<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: WorkerHost> WorkerHost for TracedHost<H> {
    async fn spawn(&self, env: &WorkerEnv) -> Result<WorkerId, HostError> {
        let span = tracing::info_span!("host.spawn", affinity = %env.affinity);
        let _guard = span.enter();

        let meters = env.addresses();
        tracing::info!(?meters, "starting worker");

        // Precondition: meter-bound affinities need their meters
        if env.affinity.needs_resource() && meters.is_empty() {
            tracing::error!("no meter in worker environment");
            return Err(HostError::SpawnFailed(format!(
                "{} worker started without a meter",
                env.affinity
            )));
        }

        let start = std::time::Instant::now();
        let result = self.inner.spawn(env).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(worker) => tracing::info!(
                %worker,
                elapsed_ms = elapsed.as_millis() as u64,
                "worker started"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "spawn failed"
            ),
        }

        result
    }

    async fn send_items(&self, worker: &WorkerId, items: &[ItemIndex]) -> Result<(), HostError> {
        let span = tracing::info_span!("host.send_items", %worker);
        let _guard = span.enter();

        tracing::debug!(?items, "sending");
        let result = self.inner.send_items(worker, items).await;

        match &result {
            Ok(()) => tracing::debug!("sent"),
            Err(e) => tracing::error!(error = %e, "send failed"),
        }

        result
    }

    async fn shutdown(&self, worker: &WorkerId) -> Result<(), HostError> {
        let span = tracing::info_span!("host.shutdown", %worker);
        let _guard = span.enter();

        let result = self.inner.shutdown(worker).await;
        match &result {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "shutdown failed"),
        }

        result
    }

    async fn terminate(&self, worker: &WorkerId) -> Result<(), HostError> {
        let span = tracing::info_span!("host.terminate", %worker);
        let _guard = span.enter();

        let result = self.inner.terminate(worker).await;
        // Failing to signal is often acceptable (worker already gone)
        match &result {
            Ok(()) => tracing::info!("terminated"),
            Err(e) => tracing::warn!(error = %e, "terminate failed (may be expected)"),
        }

        result
    }

    async fn wait_exit(&self, worker: &WorkerId, grace: Duration) -> Result<bool, HostError> {
        let span = tracing::info_span!("host.wait_exit", %worker);
        let _guard = span.enter();

        let result = self.inner.wait_exit(worker, grace).await;
        match &result {
            Ok(true) => tracing::info!("worker exited"),
            Ok(false) => tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "worker still running after grace period"
            ),
            Err(e) => tracing::debug!(error = %e, "nothing to wait for"),
        }

        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
