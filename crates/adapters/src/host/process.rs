// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process worker host
//!
//! Each worker is a child process that reads newline-delimited JSON
//! [`WorkerMessage`]s on stdin.
//!
//! Children are forgotten once reaped by [`WorkerHost::wait_exit`] or
//! [`ProcessHost::wait`]. Spawning also sweeps out any that already exited.

use super::{HostError, WorkerHost};
use async_trait::async_trait;
use ms_core::{ItemIndex, WorkerEnv, WorkerId};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Env var carrying the worker's own id
pub const ENV_WORKER_ID: &str = "MS_WORKER_ID";

/// Line protocol from coordinator to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Run { items: Vec<ItemIndex> },
    Shutdown,
}

#[derive(Clone)]
pub struct ProcessHost {
    program: PathBuf,
    args: Vec<String>,
    children: Arc<Mutex<HashMap<WorkerId, Child>>>,
    next_id: Arc<AtomicU64>,
}

impl ProcessHost {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            children: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn write(&self, worker: &WorkerId, message: &WorkerMessage) -> Result<(), HostError> {
        let mut line = serde_json::to_string(message).map_err(|e| HostError::SendFailed {
            worker: worker.clone(),
            message: e.to_string(),
        })?;
        line.push('\n');

        let mut children = self.children.lock().await;
        let child = children
            .get_mut(worker)
            .ok_or_else(|| HostError::NotFound(worker.clone()))?;
        let stdin = child.stdin.as_mut().ok_or_else(|| HostError::SendFailed {
            worker: worker.clone(),
            message: "stdin closed".to_string(),
        })?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| HostError::SendFailed {
                worker: worker.clone(),
                message: e.to_string(),
            })?;
        stdin.flush().await.map_err(|e| HostError::SendFailed {
            worker: worker.clone(),
            message: e.to_string(),
        })
    }

    /// Children not yet reaped
    pub async fn tracked(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.children.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for a worker to exit and forget it. Returns its exit code.
    pub async fn wait(&self, worker: &WorkerId) -> Result<Option<i32>, HostError> {
        let child = self.children.lock().await.remove(worker);
        let mut child = child.ok_or_else(|| HostError::NotFound(worker.clone()))?;
        let status = child.wait().await.map_err(|e| HostError::SendFailed {
            worker: worker.clone(),
            message: e.to_string(),
        })?;
        Ok(status.code())
    }
}

#[async_trait]
impl WorkerHost for ProcessHost {
    async fn spawn(&self, env: &WorkerEnv) -> Result<WorkerId, HostError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = WorkerId::new(format!("{}-{}", env.affinity, n));

        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(env.to_vars())
            .env(ENV_WORKER_ID, id.as_str())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostError::SpawnFailed(format!("{}: {}", self.program.display(), e)))?;

        let mut children = self.children.lock().await;
        children.retain(|_, c| !matches!(c.try_wait(), Ok(Some(_))));
        children.insert(id.clone(), child);
        Ok(id)
    }

    async fn send_items(&self, worker: &WorkerId, items: &[ItemIndex]) -> Result<(), HostError> {
        self.write(
            worker,
            &WorkerMessage::Run {
                items: items.to_vec(),
            },
        )
        .await
    }

    async fn shutdown(&self, worker: &WorkerId) -> Result<(), HostError> {
        self.write(worker, &WorkerMessage::Shutdown).await?;
        // Closing stdin is the end-of-work signal for workers that read to EOF
        if let Some(child) = self.children.lock().await.get_mut(worker) {
            drop(child.stdin.take());
        }
        Ok(())
    }

    async fn terminate(&self, worker: &WorkerId) -> Result<(), HostError> {
        let children = self.children.lock().await;
        let child = children
            .get(worker)
            .ok_or_else(|| HostError::NotFound(worker.clone()))?;
        let Some(pid) = child.id() else {
            // Already reaped
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| HostError::SendFailed {
            worker: worker.clone(),
            message: e.to_string(),
        })?;
        kill(Pid::from_raw(pid), Signal::SIGINT).map_err(|e| HostError::SendFailed {
            worker: worker.clone(),
            message: e.to_string(),
        })
    }

    async fn wait_exit(&self, worker: &WorkerId, grace: Duration) -> Result<bool, HostError> {
        let child = self.children.lock().await.remove(worker);
        let mut child = child.ok_or_else(|| HostError::NotFound(worker.clone()))?;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%worker, ?status, "worker reaped");
                Ok(true)
            }
            Ok(Err(e)) => Err(HostError::SendFailed {
                worker: worker.clone(),
                message: e.to_string(),
            }),
            Err(_) => {
                self.children.lock().await.insert(worker.clone(), child);
                Ok(false)
            }
        }
    }
}
