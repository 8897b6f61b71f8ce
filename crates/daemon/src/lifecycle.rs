// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy daemon lifecycle: startup and shutdown.

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use fs2::FileExt;
use ms_core::{Address, ConfigError, SchedulerConfig};
use ms_storage::{
    LockBroker, LockSnapshot, RetryPolicy, RetryingLockStore, SqliteLockStore, StoreError,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::proxy::{LockProxy, ProxyError, ProxyHandle};

pub const ENV_DB: &str = "MS_DB";
pub const ENV_CONFIG: &str = "MS_CONFIG";
pub const ENV_STATE_DIR: &str = "MS_STATE_DIR";
pub const ENV_SOCKET_DIR: &str = "MS_SOCKET_DIR";

/// Store the proxy daemon serves
pub type DaemonStore = RetryingLockStore<SqliteLockStore>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Config for one database. Runtime files live under a directory keyed
    /// by a hash of the URL so proxies for different databases coexist.
    pub fn for_database(
        database_url: impl Into<String>,
        scheduler: SchedulerConfig,
    ) -> Result<Self, LifecycleError> {
        let database_url = database_url.into();
        let hash = database_hash(&database_url);
        let state_dir = state_dir()?.join("proxies").join(&hash);
        let socket_path = scheduler
            .lock_socket
            .clone()
            .unwrap_or_else(|| default_socket_path(&database_url));

        Ok(Self {
            snapshot_path: scheduler.snapshot_path(),
            database_url,
            socket_path,
            lock_path: state_dir.join("msd.pid"),
            log_path: state_dir.join("msd.log"),
            scheduler,
        })
    }

    /// Resolve from `MS_DB`/`MS_CONFIG` unless given explicitly
    pub fn from_env(
        database_url: Option<String>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, LifecycleError> {
        let database_url = database_url
            .or_else(|| std::env::var(ENV_DB).ok())
            .filter(|u| !u.is_empty())
            .ok_or(LifecycleError::NoDatabase)?;
        let config_path = config_path.or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
        let scheduler = match config_path {
            Some(path) => SchedulerConfig::load(&path)?,
            None => {
                let mut config = SchedulerConfig::default();
                config.apply_env(|k| std::env::var(k).ok())?;
                config
            }
        };
        Self::for_database(database_url, scheduler)
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub proxy: ProxyHandle,
    pub start_time: Instant,
}

impl DaemonState {
    /// Stop the proxy, release what it still holds, and remove runtime files.
    /// Returns the addresses that could not be released.
    pub async fn shutdown(self) -> Result<Vec<(Address, StoreError)>, LifecycleError> {
        info!("shutting down lock proxy");
        let failed = self.proxy.stop().await?;
        for (address, e) in &failed {
            warn!(%address, error = %e, "meter left locked");
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "lock proxy shutdown complete"
        );
        Ok(failed)
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no database given: pass a URL or set {ENV_DB}")]
    NoDatabase,

    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: lock proxy already running?")]
    LockFailed(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // The files belong to the proxy that holds the lock
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Acquire lock file FIRST - prevents races
    // Not truncated until locked: a running proxy's pid must survive
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // Open the store BEFORE binding the socket so workers never reach a
    // proxy without a backend
    let store = SqliteLockStore::connect(&config.database_url).await?;
    let store = RetryingLockStore::new(store, RetryPolicy::from(&config.scheduler.retry));
    let broker = LockBroker::new(store).with_snapshot(LockSnapshot::new(&config.snapshot_path));

    // Bind LAST - only after all validation passes
    let proxy = LockProxy::bind(&config.socket_path, broker)?.start();

    info!(
        database = %config.database_url,
        socket = %config.socket_path.display(),
        "lock proxy started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        proxy,
        start_time: Instant::now(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// State directory for the proxy daemon
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = std::env::var_os(ENV_STATE_DIR) {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .map(|d| d.join("ms"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Socket directory, kept short for the SUN_LEN limit
pub fn socket_dir() -> PathBuf {
    std::env::var_os(ENV_SOCKET_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/ms"))
}

/// Default socket path for a database when none is configured
pub fn default_socket_path(database_url: &str) -> PathBuf {
    socket_dir().join(format!("{}.sock", database_hash(database_url)))
}

fn database_hash(database_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(database_url.as_bytes());
    let result = hasher.finalize();
    // First 16 chars of hex digest
    hex_encode(&result[..8])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
