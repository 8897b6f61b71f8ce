// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use tempfile::TempDir;

/// `ms` with the scheduler environment cleared
pub fn ms() -> Command {
    let mut cmd = Command::cargo_bin("ms").unwrap();
    cmd.env_remove("MS_DB")
        .env_remove("MS_LOCK_SOCKET")
        .env_remove("MS_SOCKET_DIR")
        .env_remove("RUST_LOG");
    cmd
}

/// A temp dir with an initialized lock table. Returns the dir and its URL.
pub fn setup_db() -> (TempDir, String) {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let url = format!("sqlite://{}", temp.path().join("meters.db").display());
    ms().args(["--db", &url, "db", "init"]).assert().success();
    (temp, url)
}

/// Add meters, optionally in a peer group
pub fn add_meters(url: &str, addresses: &[&str], group: Option<&str>) {
    let mut cmd = ms();
    cmd.args(["--db", url, "meters", "add"]).args(addresses);
    if let Some(group) = group {
        cmd.args(["--group", group]);
    }
    cmd.assert().success();
}
