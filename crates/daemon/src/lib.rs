// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Lock proxy: protocol, server, client, and daemon lifecycle

pub mod client;
pub mod lifecycle;
pub mod protocol;
pub mod proxy;
mod server;

pub use client::{ClientError, LockProxyClient};
pub use lifecycle::{Config, DaemonState, LifecycleError};
pub use protocol::{ErrorKind, ProtocolError, Request, Response, PROTOCOL_VERSION};
pub use proxy::{LockProxy, ProxyError, ProxyHandle};
