// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock proxy client used by worker processes

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ms_core::{Address, Resource, ResourceFilter};
use ms_storage::{LockStore, StoreError};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::protocol::{self, ProtocolError, Request, Response, PROTOCOL_VERSION};

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for a single request/response exchange
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("MS_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(60))
}

/// How long a call waits for the proxy socket to come up
pub fn timeout_connect() -> Duration {
    parse_duration_ms("MS_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(30))
}

/// Polling interval for connect retries
pub fn poll_interval() -> Duration {
    parse_duration_ms("MS_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(50))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("lock proxy at {} not ready after {}ms", path.display(), waited.as_millis())]
    NotReady { path: PathBuf, waited: Duration },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("proxy error: {0}")]
    Store(StoreError),

    #[error("Unexpected response from proxy")]
    UnexpectedResponse,
}

impl From<ClientError> for StoreError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Store(e) => e,
            ClientError::NotReady { .. } | ClientError::Io(_) => StoreError::Unreachable {
                operation: "proxy connect".to_string(),
                attempts: 1,
                message: e.to_string(),
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Talks to a [`LockProxy`](crate::LockProxy) over its Unix socket
#[derive(Debug, Clone)]
pub struct LockProxyClient {
    socket_path: PathBuf,
    connect_timeout: Duration,
    io_timeout: Duration,
    retry_interval: Duration,
}

impl LockProxyClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: timeout_connect(),
            io_timeout: timeout_ipc(),
            retry_interval: poll_interval(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connect, retrying while the socket is missing or refusing so that a
    /// call made before the proxy is up waits for it
    async fn connect(&self) -> Result<UnixStream, ClientError> {
        let start = Instant::now();
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    if start.elapsed() >= self.connect_timeout {
                        return Err(ClientError::NotReady {
                            path: self.socket_path.clone(),
                            waited: start.elapsed(),
                        });
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(request)?;
        tokio::time::timeout(self.io_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let bytes = tokio::time::timeout(self.io_timeout, protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(protocol::decode(&bytes)?)
    }

    /// Send and turn an error response into a store error about `address`
    async fn call(&self, request: Request, address: Option<&Address>) -> Result<Response, ClientError> {
        match self.send(&request).await? {
            Response::Error { kind, message } => Err(ClientError::Store(protocol::store_error(
                kind, message, address,
            ))),
            response => Ok(response),
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.call(Request::Ping, None).await? {
            Response::Pong => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Proxy protocol version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        let request = Request::Hello {
            version: PROTOCOL_VERSION.to_string(),
        };
        match self.call(request, None).await? {
            Response::Hello { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Addresses currently held through the proxy
    pub async fn held(&self) -> Result<Vec<Address>, ClientError> {
        match self.call(Request::Held, None).await? {
            Response::Held { addresses } => Ok(addresses),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

#[async_trait]
impl LockStore for LockProxyClient {
    async fn try_lock(&self, address: &Address, holder: &str) -> Result<bool, StoreError> {
        let request = Request::Lock {
            address: address.clone(),
            holder: holder.to_string(),
        };
        match self.call(request, Some(address)).await? {
            Response::Locked { acquired } => Ok(acquired),
            _ => Err(ClientError::UnexpectedResponse.into()),
        }
    }

    async fn unlock(&self, address: &Address) -> Result<(), StoreError> {
        let request = Request::Unlock {
            address: address.clone(),
        };
        match self.call(request, Some(address)).await? {
            Response::Unlocked => Ok(()),
            _ => Err(ClientError::UnexpectedResponse.into()),
        }
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let request = Request::List {
            filter: filter.clone(),
        };
        match self.call(request, None).await? {
            Response::Resources { resources } => Ok(resources),
            _ => Err(ClientError::UnexpectedResponse.into()),
        }
    }

    async fn get(&self, address: &Address) -> Result<Option<Resource>, StoreError> {
        let request = Request::Get {
            address: address.clone(),
        };
        match self.call(request, Some(address)).await? {
            Response::Meter { resource } => Ok(resource),
            _ => Err(ClientError::UnexpectedResponse.into()),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
