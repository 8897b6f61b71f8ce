// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock proxy wire protocol
//!
//! Each frame is a 4-byte big-endian length followed by a JSON body. A
//! connection carries exactly one request and one response.

use std::time::Duration;

use ms_core::{Address, Resource, ResourceFilter};
use ms_storage::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const PROTOCOL_VERSION: &str = "1";

/// Read/write timeout for a single frame
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Hello { version: String },
    Ping,
    Lock { address: Address, holder: String },
    Unlock { address: Address },
    List { filter: ResourceFilter },
    Get { address: Address },
    /// Addresses locked through this proxy and not yet unlocked
    Held,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Hello { version: String },
    Pong,
    Locked { acquired: bool },
    Unlocked,
    Resources { resources: Vec<Resource> },
    Meter { resource: Option<Resource> },
    Held { addresses: Vec<Address> },
    Error { kind: ErrorKind, message: String },
}

/// Lets the client rebuild the store error the proxy saw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotLocked,
    UnknownResource,
    Unreachable,
    Other,
}

impl Response {
    pub fn from_store_error(e: &StoreError) -> Self {
        let kind = match e {
            StoreError::NotLocked(_) => ErrorKind::NotLocked,
            StoreError::UnknownResource(_) => ErrorKind::UnknownResource,
            StoreError::Unreachable { .. } => ErrorKind::Unreachable,
            StoreError::Transient(_) | StoreError::Backend(_) => ErrorKind::Other,
        };
        Response::Error {
            kind,
            message: e.to_string(),
        }
    }
}

/// Rebuild a store error from an error response about `address`
pub fn store_error(kind: ErrorKind, message: String, address: Option<&Address>) -> StoreError {
    match (kind, address) {
        (ErrorKind::NotLocked, Some(a)) => StoreError::NotLocked(a.clone()),
        (ErrorKind::UnknownResource, Some(a)) => StoreError::UnknownResource(a.clone()),
        (ErrorKind::Unreachable, _) => StoreError::Unreachable {
            operation: "proxy".to_string(),
            attempts: 1,
            message,
        },
        _ => StoreError::Backend(message),
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {0} bytes")]
    TooLarge(usize),
    #[error("timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
}

/// Serialize to JSON, without the length prefix
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(msg)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let len = u32::try_from(data.len()).map_err(|_| ProtocolError::TooLarge(data.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
