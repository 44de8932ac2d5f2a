use super::*;
use std::time::Duration;

// --- config.rs tests ---

#[test]
fn test_config_defaults() {
    let config = TimeSyncConfig::default();

    assert_eq!(config.interface, "eth0");
    assert_eq!(config.bind_addr, "0.0.0.0:5810".parse().unwrap());
    assert!(config.leader_addr.is_none());
    assert_eq!(config.io_timeout, Duration::from_millis(50));
    assert_eq!(config.software_samples, 5);
    assert!(config.prefer_hardware);
    assert_eq!(config.retry_backoff, Duration::from_millis(10));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_builder() {
    let leader = "10.0.0.1:5810".parse().unwrap();
    let config = TimeSyncConfig::builder()
        .interface("lo")
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .leader_addr(leader)
        .io_timeout(Duration::from_millis(20))
        .software_samples(9)
        .prefer_hardware(false)
        .retry_backoff(Duration::from_millis(1))
        .build();

    assert_eq!(config.interface, "lo");
    assert_eq!(config.leader_addr, Some(leader));
    assert_eq!(config.io_timeout, Duration::from_millis(20));
    assert_eq!(config.software_samples, 9);
    assert!(!config.prefer_hardware);
    assert_eq!(config.retry_backoff, Duration::from_millis(1));
}

#[test]
fn test_config_from_json_partial() {
    let config = TimeSyncConfig::from_json(
        r#"{"interface": "enp3s0", "io_timeout_ms": 25, "leader_addr": "192.168.1.2:5810"}"#,
    )
    .unwrap();

    assert_eq!(config.interface, "enp3s0");
    assert_eq!(config.io_timeout, Duration::from_millis(25));
    assert_eq!(config.leader_addr, Some("192.168.1.2:5810".parse().unwrap()));
    assert_eq!(config.software_samples, 5);
}

#[test]
fn test_config_json_roundtrip() {
    let config = TimeSyncConfig::builder()
        .interface("eth1")
        .retry_backoff(Duration::from_millis(30))
        .build();
    let json = config.to_json().unwrap();
    assert!(json.contains("\"retry_backoff_ms\": 30"));
    assert_eq!(TimeSyncConfig::from_json(&json).unwrap(), config);
}

#[test]
fn test_config_rejects_invalid_values() {
    let err = TimeSyncConfig::from_json(r#"{"io_timeout_ms": 0}"#).unwrap_err();
    assert!(matches!(err, crate::error::TimeSyncError::Config { .. }));

    let err = TimeSyncConfig::from_json(r#"{"software_samples": 0}"#).unwrap_err();
    assert!(err.to_string().contains("software_samples"));

    let err = TimeSyncConfig::builder().interface("").build().validate().unwrap_err();
    assert!(err.to_string().contains("interface"));
}

#[test]
fn test_config_rejects_malformed_json() {
    let err = TimeSyncConfig::from_json("{ not json").unwrap_err();
    assert!(matches!(err, crate::error::TimeSyncError::Config { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timesync.json");
    std::fs::write(&path, r#"{"prefer_hardware": false}"#).unwrap();

    let config = TimeSyncConfig::from_file(&path).unwrap();
    assert!(!config.prefer_hardware);

    let err = TimeSyncConfig::from_file(dir.path().join("missing.json")).unwrap_err();
    assert!(err.to_string().contains("missing.json"));
}

// --- stats.rs tests ---

#[test]
fn test_stats_counters() {
    let stats = SyncStats::default();
    assert_eq!(stats.snapshot(), SyncStatsSnapshot::default());

    stats.record_success(120);
    stats.record_success(80);
    stats.record_timeout();
    stats.record_failure();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.completed, 2);
    assert_eq!(snapshot.timed_out, 1);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.last_path_delay_micros, 80);
    assert_eq!(snapshot.attempted(), 4);
}
