// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

#[test]
fn empty_file_uses_defaults() {
    let config = SchedulerConfig::from_toml_str("").unwrap();
    assert_eq!(config, SchedulerConfig::default());
    assert_eq!(config.lock_timeout, Duration::from_secs(18000));
    assert_eq!(config.retry.attempts, 10);
}

#[test]
fn durations_parse_as_humantime() {
    let config = SchedulerConfig::from_toml_str(
        r#"
lock_timeout = "2s"
poll_interval = "250ms"
default_scope = "byfile"
meters = ["10.0.0.1"]

[retry]
backoff = "1s"
"#,
    )
    .unwrap();

    assert_eq!(config.lock_timeout, Duration::from_secs(2));
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    assert_eq!(config.default_scope, ScopeMode::ByFile);
    assert_eq!(config.meters, vec![Address::from("10.0.0.1")]);
    assert_eq!(config.retry.backoff, Duration::from_secs(1));
    assert_eq!(config.retry.call_timeout, Duration::from_secs(30));
}

#[test]
fn unknown_scope_mode_is_rejected() {
    assert!(SchedulerConfig::from_toml_str("default_scope = \"bydir\"").is_err());
}

#[test]
fn env_overrides_file_values() {
    let mut config = SchedulerConfig::default();
    config
        .apply_env(vars(&[
            ("MS_LOCK_TIMEOUT", "90"),
            ("MS_MAX_METERS", "3"),
            ("MS_LOCK_SOCKET", "/tmp/ms.sock"),
        ]))
        .unwrap();

    assert_eq!(config.lock_timeout, Duration::from_secs(90));
    assert_eq!(config.max_resources, 3);
    assert_eq!(config.lock_socket, Some(PathBuf::from("/tmp/ms.sock")));
}

#[test]
fn invalid_env_value_is_reported() {
    let mut config = SchedulerConfig::default();
    let err = config.apply_env(vars(&[("MS_MAX_METERS", "many")])).unwrap_err();
    assert!(err.to_string().contains("MS_MAX_METERS"));
}

#[test]
fn holder_host_appends_build_id() {
    assert_eq!(
        default_holder_host(vars(&[("HOSTNAME", "ci-agent"), ("BUILD_BUILDID", "4711")])),
        "ci-agent-4711"
    );
    assert_eq!(default_holder_host(vars(&[("HOSTNAME", "desk")])), "desk");
}

#[test]
fn explicit_holder_host_wins() {
    let config = SchedulerConfig {
        holder_host: Some("bench-7".to_string()),
        ..SchedulerConfig::default()
    };
    assert_eq!(config.holder_host(), "bench-7");
}

#[test]
fn snapshot_path_uses_configured_dir() {
    let config = SchedulerConfig {
        snapshot_dir: Some(PathBuf::from("/var/tmp/run")),
        ..SchedulerConfig::default()
    };
    assert_eq!(
        config.snapshot_path(),
        PathBuf::from("/var/tmp/run/parallel.locks.json")
    );
}

#[test]
fn parse_duration_accepts_both_forms() {
    assert_eq!(parse_duration("5h"), Some(Duration::from_secs(18000)));
    assert_eq!(parse_duration(" 12 "), Some(Duration::from_secs(12)));
    assert_eq!(parse_duration("soon"), None);
}
