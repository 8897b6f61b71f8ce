// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! A handful of `MS_*` environment variables override the file.

use crate::resource::Address;
use crate::work::{Affinity, Classifier, ScopeMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_LOCK_TIMEOUT: &str = "MS_LOCK_TIMEOUT";
pub const ENV_MAX_METERS: &str = "MS_MAX_METERS";
pub const ENV_LOCK_SOCKET: &str = "MS_LOCK_SOCKET";

/// Snapshot file name written into `snapshot_dir`
pub const SNAPSHOT_FILE: &str = "parallel.locks.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Storage retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first
    pub attempts: u32,
    /// Fixed delay between attempts
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    /// Upper bound on a single storage call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_secs(20),
            call_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a category may wait, holding nothing, before the session fails
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Ceiling on meters held at once, singles and group members together
    pub max_resources: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Spacing of "waiting for lock" notices
    #[serde(with = "humantime_serde")]
    pub notice_interval: Duration,
    /// How long closing waits for interrupted workers before releasing meters
    #[serde(with = "humantime_serde")]
    pub exit_grace: Duration,
    /// Grouped rollback cycles tolerated while holding no group
    pub group_retry_limit: Option<u32>,
    /// Items kept in flight per worker
    pub prefetch: usize,
    pub default_scope: ScopeMode,
    pub single_fixtures: Vec<String>,
    pub multi_fixtures: Vec<String>,
    /// Written to `owner_host`; derived from the environment when unset
    pub holder_host: Option<String>,
    pub snapshot_dir: Option<PathBuf>,
    /// Lock proxy socket handed to workers
    pub lock_socket: Option<PathBuf>,
    /// When non-empty, only these meters are candidates
    pub meters: Vec<Address>,
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5 * 60 * 60),
            max_resources: 999,
            poll_interval: Duration::from_secs(5),
            notice_interval: Duration::from_secs(60),
            exit_grace: Duration::from_secs(10),
            group_retry_limit: None,
            prefetch: 2,
            default_scope: ScopeMode::ByTest,
            single_fixtures: vec![
                "meter".to_string(),
                "preinstalled_meter".to_string(),
                "meter_db".to_string(),
            ],
            multi_fixtures: vec![
                "multi_meter".to_string(),
                "preinstalled_multi_meter".to_string(),
            ],
            holder_host: None,
            snapshot_dir: None,
            lock_socket: None,
            meters: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    /// Apply `MS_*` overrides from a variable lookup
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = var(ENV_LOCK_TIMEOUT) {
            self.lock_timeout = parse_duration(&value).ok_or(ConfigError::InvalidEnv {
                var: ENV_LOCK_TIMEOUT,
                value,
            })?;
        }
        if let Some(value) = var(ENV_MAX_METERS) {
            self.max_resources = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_MAX_METERS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = var(ENV_LOCK_SOCKET) {
            if !value.is_empty() {
                self.lock_socket = Some(PathBuf::from(value));
            }
        }
        Ok(())
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.default_scope)
            .with_fixtures(Affinity::Single, self.single_fixtures.iter().cloned())
            .with_fixtures(Affinity::Multi, self.multi_fixtures.iter().cloned())
    }

    /// Host name recorded on locked rows
    pub fn holder_host(&self) -> String {
        self.holder_host
            .clone()
            .unwrap_or_else(|| default_holder_host(|k| std::env::var(k).ok()))
    }

    /// Where the held-lock snapshot is written
    pub fn snapshot_path(&self) -> PathBuf {
        let dir = self.snapshot_dir.clone().unwrap_or_else(|| {
            std::env::var_os("BUILD_ARTIFACTSTAGINGDIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        dir.join(SNAPSHOT_FILE)
    }
}

/// `$HOSTNAME`, suffixed with the CI build id when one is set
pub fn default_holder_host(var: impl Fn(&str) -> Option<String>) -> String {
    let host = var("HOSTNAME")
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string());
    match var("BUILD_BUILDID").filter(|b| !b.is_empty()) {
        Some(build) => format!("{host}-{build}"),
        None => host,
    }
}

/// Humantime (`90s`, `5h`) or bare seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).ok()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
