// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use ms_storage::{LockBroker, LockStore};
use tokio::net::UnixStream;
use tracing::{debug, error};

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// Handle a single client connection
pub async fn handle_connection<S: LockStore>(
    broker: &LockBroker<S>,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "failed to read request");
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");
    let response = handle_request(broker, request).await;
    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<S: LockStore>(broker: &LockBroker<S>, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Lock { address, holder } => match broker.try_lock(&address, &holder).await {
            Ok(acquired) => Response::Locked { acquired },
            Err(e) => Response::from_store_error(&e),
        },

        Request::Unlock { address } => match broker.unlock(&address).await {
            Ok(()) => Response::Unlocked,
            Err(e) => Response::from_store_error(&e),
        },

        Request::List { filter } => match broker.list_resources(&filter).await {
            Ok(resources) => Response::Resources { resources },
            Err(e) => Response::from_store_error(&e),
        },

        Request::Get { address } => match broker.get(&address).await {
            Ok(resource) => Response::Meter { resource },
            Err(e) => Response::from_store_error(&e),
        },

        Request::Held => Response::Held {
            addresses: broker.held(),
        },
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
