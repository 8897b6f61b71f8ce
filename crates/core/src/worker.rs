// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution slots registered by the host framework

use crate::resource::Address;
use crate::work::Affinity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the host framework uses for a worker process
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered worker and the meters it currently holds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub affinity: Affinity,
    pub held: Vec<Address>,
}

impl Worker {
    pub fn new(id: WorkerId, affinity: Affinity) -> Self {
        Self {
            id,
            affinity,
            held: Vec::new(),
        }
    }

    pub fn with_held(mut self, held: Vec<Address>) -> Self {
        self.held = held;
        self
    }

    pub fn holds_resource(&self) -> bool {
        !self.held.is_empty()
    }
}
