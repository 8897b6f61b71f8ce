// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI integration tests for lock table administration

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

mod common;

use common::{add_meters, ms, setup_db};
use predicates::prelude::*;

#[test]
fn test_meters_help() {
    ms().args(["meters", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("deactivate"));
}

#[test]
fn test_missing_database_suggests_flag() {
    ms().args(["meters", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No lock table database given"))
        .stderr(predicate::str::contains("MS_DB"));
}

#[test]
fn test_init_is_idempotent() {
    let (_temp, url) = setup_db();
    ms().args(["--db", &url, "db", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized lock table"));
}

#[test]
fn test_add_and_list() {
    let (_temp, url) = setup_db();
    add_meters(&url, &["10.0.0.1", "10.0.0.2"], None);
    add_meters(&url, &["10.0.1.1", "10.0.1.2"], Some("rack1"));

    ms().args(["--db", &url, "meters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.1"))
        .stdout(predicate::str::contains("10.0.1.2"))
        .stdout(predicate::str::contains("rack1"));

    ms().args(["--db", &url, "meters", "list", "--singles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2"))
        .stdout(predicate::str::contains("rack1").not());
}

#[test]
fn test_list_json() {
    let (_temp, url) = setup_db();
    add_meters(&url, &["10.0.0.1"], Some("rack1"));

    let output = ms()
        .args(["--db", &url, "meters", "list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["address"], "10.0.0.1");
    assert_eq!(rows[0]["busy"], false);
    assert_eq!(rows[0]["peer_group"], "rack1");
    assert_eq!(rows[0]["status"], "active");
}

#[test]
fn test_empty_table_lists_nothing() {
    let (_temp, url) = setup_db();
    ms().args(["--db", &url, "meters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No meters"));
}

#[test]
fn test_deactivate_hides_from_default_list() {
    let (_temp, url) = setup_db();
    add_meters(&url, &["10.0.0.1", "10.0.0.2"], None);

    ms().args(["--db", &url, "meters", "deactivate", "10.0.0.2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2 is now inactive"));

    ms().args(["--db", &url, "meters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2").not());

    ms().args(["--db", &url, "meters", "list", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2"));

    ms().args(["--db", &url, "meters", "activate", "10.0.0.2"])
        .assert()
        .success();
    ms().args(["--db", &url, "meters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2"));
}

#[test]
fn test_unknown_meter_suggests_add() {
    let (_temp, url) = setup_db();
    ms().args(["--db", &url, "meters", "activate", "10.9.9.9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Meter '10.9.9.9' not found"))
        .stderr(predicate::str::contains("ms meters add 10.9.9.9"));
}

#[test]
fn test_release_free_meter_is_noop() {
    let (_temp, url) = setup_db();
    add_meters(&url, &["10.0.0.1"], None);
    ms().args(["--db", &url, "meters", "release", "10.0.0.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.1 was not locked"));
}

#[test]
fn test_uninitialized_database_suggests_init() {
    let temp = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", temp.path().join("fresh.db").display());
    ms().args(["--db", &url, "meters", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("db init"));
}

#[test]
fn test_db_from_environment() {
    let (_temp, url) = setup_db();
    add_meters(&url, &["10.0.0.7"], None);
    ms().env("MS_DB", &url)
        .args(["meters", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.7"));
}
