// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Lock table storage: the SQLite backend, retries, and the held-lock broker

pub mod broker;
pub mod retry;
pub mod snapshot;
pub mod sqlite;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use broker::LockBroker;
pub use retry::{RetryPolicy, RetryingLockStore};
pub use snapshot::{LockSnapshot, SnapshotError};
pub use sqlite::SqliteLockStore;
pub use store::{LockStore, StoreError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryLockStore, StoreCall};
