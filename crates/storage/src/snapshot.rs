// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Held-lock side file for operators
//!
//! A JSON array of the addresses currently held, rewritten after every
//! change. Nothing reads it back for scheduling decisions.

use ms_core::Address;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct LockSnapshot {
    path: PathBuf,
}

impl LockSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents atomically
    pub fn write(&self, held: &[Address]) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(held)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Write, logging instead of failing
    pub fn record(&self, held: &[Address]) {
        if let Err(e) = self.write(held) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write lock snapshot");
        }
    }

    /// Addresses in the file; a missing file means nothing is held
    pub fn read(&self) -> Result<Vec<Address>, SnapshotError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
