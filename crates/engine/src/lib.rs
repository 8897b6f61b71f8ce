// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Meter scheduling engine: resource polling and the host-facing scheduler

mod error;
mod poller;
mod scheduler;

pub use error::{Category, FatalCause, SessionError};
pub use poller::{Demand, Phase, ResourcePoller, Spawned};
pub use scheduler::Scheduler;
