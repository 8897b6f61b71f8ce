// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment handed to spawned workers

use crate::resource::Address;
use crate::work::Affinity;
use std::path::PathBuf;

pub const ENV_AFFINITY: &str = "MS_AFFINITY";
pub const ENV_METER_TARGET: &str = "MS_METER_TARGET";
pub const ENV_MULTI_METER_TARGET: &str = "MS_MULTI_METER_TARGET";
pub const ENV_LOCK_SOCKET: &str = crate::config::ENV_LOCK_SOCKET;

/// What a worker needs to know about the slot it was started for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    pub affinity: Affinity,
    pub meter: Option<Address>,
    pub multi_meters: Vec<Address>,
    pub lock_socket: Option<PathBuf>,
}

impl WorkerEnv {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn single(meter: Address) -> Self {
        Self {
            affinity: Affinity::Single,
            meter: Some(meter),
            ..Self::default()
        }
    }

    pub fn multi(meters: Vec<Address>) -> Self {
        Self {
            affinity: Affinity::Multi,
            multi_meters: meters,
            ..Self::default()
        }
    }

    pub fn with_lock_socket(mut self, socket: Option<PathBuf>) -> Self {
        self.lock_socket = socket;
        self
    }

    /// Meters bound to this worker
    pub fn addresses(&self) -> Vec<Address> {
        self.meter
            .iter()
            .chain(self.multi_meters.iter())
            .cloned()
            .collect()
    }

    pub fn to_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![(ENV_AFFINITY.to_string(), self.affinity.to_string())];
        if let Some(meter) = &self.meter {
            vars.push((ENV_METER_TARGET.to_string(), meter.to_string()));
        }
        if !self.multi_meters.is_empty() {
            let joined = self
                .multi_meters
                .iter()
                .map(Address::as_str)
                .collect::<Vec<_>>()
                .join(",");
            vars.push((ENV_MULTI_METER_TARGET.to_string(), joined));
        }
        if let Some(socket) = &self.lock_socket {
            vars.push((ENV_LOCK_SOCKET.to_string(), socket.display().to_string()));
        }
        vars
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let affinity = var(ENV_AFFINITY)
            .map(Affinity::from)
            .unwrap_or_default();
        let meter = var(ENV_METER_TARGET)
            .filter(|m| !m.is_empty())
            .map(Address::from);
        let multi_meters = var(ENV_MULTI_METER_TARGET)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(Address::from)
                    .collect()
            })
            .unwrap_or_default();
        let lock_socket = var(ENV_LOCK_SOCKET)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self {
            affinity,
            meter,
            multi_meters,
            lock_socket,
        }
    }

    /// Read the worker's own environment
    pub fn from_env() -> Self {
        Self::from_vars(|k| std::env::var(k).ok())
    }
}
