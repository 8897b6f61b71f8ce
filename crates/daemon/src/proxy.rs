// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock proxy: one lock store connection shared by many worker processes
//!
//! [`LockProxy::bind`] returns once the socket is listening, so a worker
//! started afterwards can connect immediately. Connections arriving before
//! the accept loop runs wait in the listen backlog.

use std::path::{Path, PathBuf};

use ms_core::Address;
use ms_storage::{LockBroker, LockStore, StoreError};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::server;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("proxy task failed: {0}")]
    Join(String),
}

pub struct LockProxy<S> {
    listener: UnixListener,
    broker: LockBroker<S>,
    socket_path: PathBuf,
}

impl<S: LockStore> LockProxy<S> {
    /// Bind the socket, replacing a stale one left by a crashed proxy.
    /// Must be called from within a tokio runtime.
    pub fn bind(socket_path: impl Into<PathBuf>, broker: LockBroker<S>) -> Result<Self, ProxyError> {
        let socket_path = socket_path.into();
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let listener = UnixListener::bind(&socket_path).map_err(|source| ProxyError::Bind {
            path: socket_path.clone(),
            source,
        })?;
        info!(socket = %socket_path.display(), "lock proxy listening");
        Ok(Self {
            listener,
            broker,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn broker(&self) -> &LockBroker<S> {
        &self.broker
    }

    /// Serve until `shutdown` flips to true, then release every lock still
    /// held through the proxy and remove the socket. Returns the addresses
    /// that could not be released.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Vec<(Address, StoreError)> {
        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, _)) => {
                        let broker = self.broker.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(&broker, stream).await {
                                error!(error = %e, "error handling connection");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "error accepting connection"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("lock proxy stopping");
        let failed = self.broker.release_all().await;
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!(error = %e, "failed to remove socket file");
        }
        failed
    }

    /// Serve on a background task
    pub fn start(self) -> ProxyHandle {
        let (tx, rx) = watch::channel(false);
        let socket_path = self.socket_path.clone();
        let task = tokio::spawn(self.run(rx));
        ProxyHandle {
            shutdown: tx,
            task,
            socket_path,
        }
    }
}

/// A proxy running on a background task
pub struct ProxyHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Vec<(Address, StoreError)>>,
    socket_path: PathBuf,
}

impl ProxyHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop serving and release everything held through the proxy
    pub async fn stop(self) -> Result<Vec<(Address, StoreError)>, ProxyError> {
        // The receiver is gone only if the task already ended
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| ProxyError::Join(e.to_string()))
    }
}
