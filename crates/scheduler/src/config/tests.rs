use std::time::Duration;

use super::{format_duration, parse_duration, LogLevel, SchedulerConfig};
use crate::error::SchedulerError;

// -- parse_duration --------------------------------------------------------

#[test]
fn parse_duration_single_units() {
    assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
    assert_eq!(parse_duration("30m"), Some(Duration::from_secs(30 * 60)));
    assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3_600)));
    assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
    assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
}

#[test]
fn parse_duration_combined() {
    assert_eq!(
        parse_duration("1d2h30m15s"),
        Some(Duration::from_secs(86_400 + 7_200 + 1_800 + 15))
    );
    assert_eq!(parse_duration("1s500ms"), Some(Duration::from_millis(1_500)));
    assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
}

#[test]
fn parse_duration_bare_number_as_seconds() {
    assert_eq!(parse_duration("120"), Some(Duration::from_secs(120)));
    assert_eq!(parse_duration(" 5 "), Some(Duration::from_secs(5)));
}

#[test]
fn parse_duration_rejects_garbage() {
    assert_eq!(parse_duration(""), None);
    assert_eq!(parse_duration("   "), None);
    assert_eq!(parse_duration("abc"), None);
    assert_eq!(parse_duration("30m15"), None);
    assert_eq!(parse_duration("5x"), None);
    assert_eq!(parse_duration("s"), None);
}

#[test]
fn format_duration_reads_back() {
    for d in [
        Duration::ZERO,
        Duration::from_millis(250),
        Duration::from_secs(90),
        Duration::from_secs(86_400 + 3_600 + 5),
    ] {
        assert_eq!(parse_duration(&format_duration(d)), Some(d), "{d:?}");
    }
    assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
}

// -- SchedulerConfig -------------------------------------------------------

#[test]
fn scheduler_config_defaults() {
    let config = SchedulerConfig::default();
    assert!(config.max_workers > 0);
    assert_eq!(config.queue_size, 64);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.shutdown_grace, Duration::from_secs(5));
}

#[test]
fn parse_full_toml() {
    let toml = r#"
max_workers = 8
queue_size = 0
log_level = "debug"
shutdown_grace = "1m"
"#;
    let cfg = SchedulerConfig::from_toml(toml).unwrap();
    assert_eq!(cfg.max_workers, 8);
    assert_eq!(cfg.queue_size, 0);
    assert_eq!(cfg.log_level, LogLevel::Debug);
    assert_eq!(cfg.shutdown_grace, Duration::from_secs(60));
}

#[test]
fn parse_grace_as_integer_seconds() {
    let cfg = SchedulerConfig::from_toml("max_workers = 2\nshutdown_grace = 7").unwrap();
    assert_eq!(cfg.shutdown_grace, Duration::from_secs(7));
}

#[test]
fn zero_workers_rejected() {
    let err = SchedulerConfig::from_toml("max_workers = 0").unwrap_err();
    assert!(matches!(err, SchedulerError::Config(_)));
}

#[test]
fn bad_duration_is_parse_error() {
    let err = SchedulerConfig::from_toml("shutdown_grace = \"soon\"").unwrap_err();
    assert!(matches!(err, SchedulerError::ConfigParse(_)));
}

#[test]
fn log_level_from_str() {
    assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
    assert!("loud".parse::<LogLevel>().is_err());
    assert_eq!(LogLevel::Error.to_string(), "error");
}

#[test]
fn config_serializes_grace_as_text() {
    let cfg = SchedulerConfig {
        max_workers: 3,
        queue_size: 1,
        log_level: LogLevel::Warn,
        shutdown_grace: Duration::from_millis(1_500),
    };
    let text = toml::to_string(&cfg).unwrap();
    assert!(text.contains("shutdown_grace = \"1500ms\""), "{text}");
    let back: SchedulerConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, cfg);
}
