// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for a scheduling session

use ms_adapters::HostError;
use ms_core::{LedgerError, RouterError};
use ms_storage::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Meter category a poll cycle works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Single,
    Multi,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Single => f.write_str("single"),
            Category::Multi => f.write_str("multi"),
        }
    }
}

/// Why a session had to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCause {
    NoResources,
    StorageUnreachable,
    Internal,
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalCause::NoResources => f.write_str("no resources available"),
            FatalCause::StorageUnreachable => f.write_str("storage unreachable"),
            FatalCause::Internal => f.write_str("internal error"),
        }
    }
}

/// Errors that can occur during a scheduling session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("meter lock timeout: no {category} meter acquired within {}s", waited.as_secs())]
    LockTimeout { category: Category, waited: Duration },
    #[error("no {category} meters in the lock table")]
    NoResources { category: Category },
    #[error("gave up on peer groups after {attempts} rolled-back attempts")]
    GroupRetriesExhausted { attempts: u32 },
    #[error("{0}")]
    StoreUnreachable(StoreError),
    #[error("{0}")]
    Store(StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("session is closed")]
    Closed,
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unreachable { .. } => SessionError::StoreUnreachable(e),
            other => SessionError::Store(other),
        }
    }
}

impl SessionError {
    /// The run cannot continue and must exit non-zero
    pub fn is_fatal(&self) -> bool {
        self.cause().is_some()
    }

    pub fn cause(&self) -> Option<FatalCause> {
        match self {
            SessionError::LockTimeout { .. }
            | SessionError::NoResources { .. }
            | SessionError::GroupRetriesExhausted { .. } => Some(FatalCause::NoResources),
            SessionError::StoreUnreachable(_) | SessionError::Store(StoreError::Backend(_)) => {
                Some(FatalCause::StorageUnreachable)
            }
            SessionError::Ledger(_) => Some(FatalCause::Internal),
            _ => None,
        }
    }
}
