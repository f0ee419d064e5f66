//! Tests for profile parsing, overrides and validation

use phloem_cli::config::ProfileConfig;
use phloem_core::command::ReplayPattern;
use phloem_core::error::ConfigError;
use phloem_core::workload::{KeyPattern, ValueSize};
use phloem_core::Error;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn profile(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn config_error(config: &ProfileConfig) -> ConfigError {
    match config.engine_config().validate() {
        Err(Error::Config(err)) => err,
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
}

const MINIMAL: &str = r#"
[experiment]
name = "minimal"

[target]
address = "127.0.0.1:6379"

[[workload.commands]]
command = "GET __key__"
"#;

#[test]
fn test_load_get_set_zipfian_profile() {
    let config = ProfileConfig::from_file("../profiles/get-set-zipfian.toml")
        .expect("Failed to load get-set-zipfian profile");

    assert_eq!(config.experiment.name, "get-set-zipfian");
    assert_eq!(config.experiment.seed, Some(42));
    assert_eq!(config.target_address(), "127.0.0.1:6379");
    assert_eq!(config.workload.key_minimum, 1);
    assert_eq!(config.workload.value_size, ValueSize::Fixed { size: 64 });
    assert_eq!(config.workload.commands.len(), 2);
    assert_eq!(config.workload.commands[1].ratio, 10);
    assert_eq!(
        config.workload.commands[1].key_pattern,
        Some(KeyPattern::Zipfian { exponent: 0.99 })
    );
    assert_eq!(config.connection.pipeline, 4);
    assert_eq!(config.run.requests, Some(10000));

    let plan = config.engine_config().validate().unwrap();
    assert_eq!(plan.total_clients(), 100);
}

#[test]
fn test_load_scan_profile() {
    let config = ProfileConfig::from_file("../profiles/scan-incremental.toml").unwrap();
    assert!(config.workload.scan.incremental);
    assert_eq!(config.workload.scan.max_iterations, Some(5));
    assert!(config.engine_config().validate().is_ok());
}

#[test]
fn test_load_monitor_replay_profile() {
    let config = ProfileConfig::from_file("../profiles/monitor-replay.toml").unwrap();
    let replay = config.workload.replay.as_ref().unwrap();

    // Relative to the profile's directory
    assert!(replay.path.ends_with("profiles/monitor.txt"));
    assert_eq!(replay.pattern, ReplayPattern::Sequential);
    assert_eq!(config.run.duration, Some(Duration::from_secs(30)));

    let plan = config.engine_config().validate().unwrap();
    assert_eq!(plan.requests_per_client(), None);
}

#[test]
fn test_load_resilient_profile() {
    let config = ProfileConfig::from_file("../profiles/resilient-rate-limited.toml").unwrap();
    let reconnect = &config.connection.reconnect;
    assert!(reconnect.enabled);
    assert_eq!(reconnect.max_attempts, 20);
    assert_eq!(reconnect.base_delay, Duration::from_millis(50));
    assert!(!reconnect.retry_failed_request);
    assert_eq!(config.target.io_timeout, Some(Duration::from_secs(1)));
    assert_eq!(config.connection.rate_limit.as_ref().unwrap().burst, 10);
    assert_eq!(config.output.format, "json");
    assert!(config.engine_config().validate().is_ok());
}

#[test]
fn test_defaults() {
    let file = profile(MINIMAL);
    let config = ProfileConfig::from_file(file.path()).unwrap();

    assert_eq!(config.run.threads, 4);
    assert_eq!(config.run.clients_per_thread, 50);
    assert_eq!(config.workload.key_maximum, 10_000_000);
    assert_eq!(config.workload.key_prefix, "memtier-");
    assert_eq!(config.connection.pipeline, 1);
    assert!(!config.connection.reconnect.enabled);
    assert_eq!(config.target.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.output.format, "text");

    let plan = config.engine_config().validate().unwrap();
    assert_eq!(plan.requests_per_client(), Some(10_000));
}

#[test]
fn test_set_overrides() {
    let file = profile(MINIMAL);
    let overrides = vec![
        "experiment.seed=7".to_string(),
        "run.threads=2".to_string(),
        "run.duration=5s".to_string(),
        "workload.commands.0.ratio=3".to_string(),
        "workload.commands.+={ command = \"SET __key__ __data__\" }".to_string(),
        "workload.key_pattern={ strategy = \"zipfian\", exponent = 1.2 }".to_string(),
        "connection.reconnect.enabled=true".to_string(),
    ];
    let config = ProfileConfig::from_file_with_overrides(file.path(), &overrides).unwrap();

    assert_eq!(config.experiment.seed, Some(7));
    assert_eq!(config.run.threads, 2);
    assert_eq!(config.run.duration, Some(Duration::from_secs(5)));
    assert_eq!(config.workload.commands[0].ratio, 3);
    assert_eq!(config.workload.commands[1].command, "SET __key__ __data__");
    assert_eq!(config.workload.key_pattern, KeyPattern::Zipfian { exponent: 1.2 });
    assert!(config.connection.reconnect.enabled);
}

#[test]
fn test_invalid_override_rejected() {
    let file = profile(MINIMAL);
    for bad in ["noequals", "workload.commands.5.ratio=1", "experiment.name.x=1"] {
        let result = ProfileConfig::from_file_with_overrides(file.path(), &[bad.to_string()]);
        assert!(result.is_err(), "{bad} accepted");
    }
}

#[test]
fn test_profile_validation() {
    let missing_target = profile("[experiment]\nname = \"x\"\n\n[target]\n");
    let err = ProfileConfig::from_file(missing_target.path()).unwrap_err();
    assert!(err.to_string().contains("Target address"), "{err}");

    let file = profile(MINIMAL);
    let err = ProfileConfig::from_file_with_overrides(file.path(), &["output.format=csv".into()])
        .unwrap_err();
    assert!(format!("{err:#}").contains("Invalid output format"), "{err:#}");
}

#[test]
fn test_engine_errors_surface_before_run() {
    let file = profile(MINIMAL);
    let load = |overrides: &[&str]| {
        let overrides: Vec<String> = overrides.iter().map(|s| s.to_string()).collect();
        ProfileConfig::from_file_with_overrides(file.path(), &overrides).unwrap()
    };

    let inverted = load(&["workload.key_minimum=10", "workload.key_maximum=5"]);
    assert_eq!(
        config_error(&inverted),
        ConfigError::InvertedKeyRange { minimum: 10, maximum: 5 }
    );

    let scan_not_cursor = load(&["workload.scan.incremental=true"]);
    assert!(matches!(config_error(&scan_not_cursor), ConfigError::ScanCommandNotCursorBearing(_)));

    let scan_pipelined = load(&[
        "workload.commands.0.command=SCAN 0",
        "workload.scan.incremental=true",
        "connection.pipeline=8",
    ]);
    assert_eq!(config_error(&scan_pipelined), ConfigError::ScanPipelineDepth(8));

    let both_limits = load(&["run.requests=10", "run.duration=1s"]);
    assert!(matches!(config_error(&both_limits), ConfigError::RunLimitConflict(_)));

    let placeholder = load(&["workload.commands.0.command=__monitor_line@__"]);
    assert!(matches!(config_error(&placeholder), ConfigError::MonitorPlaceholderWithoutLog(_)));
}

#[test]
fn test_malformed_placeholder_depends_on_replay() {
    let file = profile(MINIMAL);
    let monitor = profile("\"GET\" \"a\"\n\"SET\" \"a\" \"b\"\n");
    let command = "workload.commands.0.command=SET __monitor_line1_ value";

    let without_log =
        ProfileConfig::from_file_with_overrides(file.path(), &[command.to_string()]).unwrap();
    assert!(without_log.engine_config().validate().is_ok());

    let replay = format!("workload.replay.path={}", monitor.path().display());
    let with_log =
        ProfileConfig::from_file_with_overrides(file.path(), &[command.to_string(), replay])
            .unwrap();
    assert!(matches!(config_error(&with_log), ConfigError::InvalidMonitorPlaceholder(_)));
}

#[test]
fn test_replay_index_out_of_range() {
    let file = profile(MINIMAL);
    let monitor = profile("\"GET\" \"a\"\nnot a command\n\"SET\" \"a\" \"b\"\n");
    let overrides = vec![
        "workload.commands.0.command=__monitor_line3__".to_string(),
        format!("workload.replay.path={}", monitor.path().display()),
    ];
    let config = ProfileConfig::from_file_with_overrides(file.path(), &overrides).unwrap();
    assert_eq!(
        config_error(&config),
        ConfigError::ReplayIndexOutOfRange { index: 3, available: 2 }
    );
}
