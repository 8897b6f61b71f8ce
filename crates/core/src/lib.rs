// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ms-core: affinity scheduling model for meter-bound test sessions
//!
//! This crate provides:
//! - Work classification by affinity and scope
//! - Per-affinity group queues and the router in front of them
//! - The held-lock ledger and scheduler configuration

pub mod clock;
pub mod config;
pub mod env;
pub mod group;
pub mod ledger;
pub mod resource;
pub mod router;
pub mod work;
pub mod worker;

pub use clock::{Clock, Deadline, FakeClock, SystemClock};
pub use config::{ConfigError, RetryConfig, SchedulerConfig};
pub use env::WorkerEnv;
pub use group::{AffinityGroupQueue, Completion, GroupError};
pub use ledger::{HeldLockLedger, Holding, LedgerError};
pub use resource::{
    group_by_peer, Address, PeerFilter, PeerGroup, Resource, ResourceFilter, ResourceGroup,
    ResourceStatus,
};
pub use router::{AffinityRouter, RouterError};
pub use work::{Affinity, Classifier, ItemIndex, Marker, Scope, ScopeMode, WorkItem, WorkItemSpec};
pub use worker::{Worker, WorkerId};
