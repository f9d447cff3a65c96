//! Tests for configuration loading and validation

use std::collections::HashMap;
use std::time::Duration;

use backup_supervisor::config::{SupervisorConfig, ENV_PREFIX, MAX_TIMEOUT_LIMIT_SECS};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = SupervisorConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.workers >= 1);
    assert_eq!(cfg.max_timeout_secs, 12 * 60 * 60);
    assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
    assert_eq!(cfg.purge_interval(), Duration::from_secs(300));
    assert_eq!(cfg.max_timeout(), chrono::Duration::hours(12));
}

#[test]
fn test_invalid_values_are_rejected() {
    let base = SupervisorConfig::default();
    let cases = [
        SupervisorConfig { workers: 0, ..base.clone() },
        SupervisorConfig { purge_agent: "  ".into(), ..base.clone() },
        SupervisorConfig { max_timeout_secs: 0, ..base.clone() },
        SupervisorConfig { max_timeout_secs: MAX_TIMEOUT_LIMIT_SECS + 1, ..base.clone() },
        SupervisorConfig { max_timeout_secs: 1_000_000_000_000_000, ..base.clone() },
        SupervisorConfig { tick_interval_ms: 0, ..base.clone() },
        SupervisorConfig { purge_interval_secs: 0, ..base.clone() },
        SupervisorConfig { reply_timeout_ms: 0, ..base.clone() },
        SupervisorConfig { worker_stack_size: 1024, ..base },
    ];
    for cfg in cases {
        assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
    }
}

#[test]
fn test_oversized_timeout_is_rejected_at_load() {
    let err = SupervisorConfig::from_lookup(lookup(&[("MAX_TIMEOUT_SECS", "1000000000000000")])).unwrap_err();
    assert!(err.to_string().contains("max_timeout_secs"));

    let ten_years = SupervisorConfig::from_lookup(lookup(&[("MAX_TIMEOUT_SECS", "315360000")])).unwrap();
    assert_eq!(ten_years.max_timeout_secs, MAX_TIMEOUT_LIMIT_SECS);
}

#[test]
fn test_from_json_fills_defaults() {
    let cfg = SupervisorConfig::from_json_str(r#"{"workers": 3, "purge_agent": "10.0.0.9:5444"}"#).unwrap();
    assert_eq!(cfg.workers, 3);
    assert_eq!(cfg.purge_agent, "10.0.0.9:5444");
    assert_eq!(cfg.tick_interval_ms, 1_000);

    assert!(SupervisorConfig::from_json_str(r#"{"workers": 0}"#).is_err());
    assert!(SupervisorConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_lookup_overrides_defaults() {
    let cfg = SupervisorConfig::from_lookup(lookup(&[
        ("WORKERS", "4"),
        ("MAX_TIMEOUT_SECS", "60"),
        ("PURGE_AGENT", "purger:5444"),
    ]))
    .unwrap();
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.max_timeout_secs, 60);
    assert_eq!(cfg.purge_agent, "purger:5444");
    assert_eq!(cfg.purge_interval_secs, 300);
}

#[test]
fn test_from_lookup_rejects_garbage() {
    let err = SupervisorConfig::from_lookup(lookup(&[("WORKERS", "many")])).unwrap_err();
    assert!(err.to_string().contains("SUPERVISOR_WORKERS"));

    assert!(SupervisorConfig::from_lookup(lookup(&[("TICK_INTERVAL_MS", "0")])).is_err());
}
