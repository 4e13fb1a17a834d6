use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration::text;

/// Log verbosity handed to the logging collaborator.
///
/// The scheduler itself never installs a subscriber; hosts read this value
/// when building their filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string usable by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently executing task functions. Must be > 0.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Submissions buffered while every worker is busy. 0 = no buffering.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Verbosity passed through to the logger.
    #[serde(default)]
    pub log_level: LogLevel,

    /// How long `stop()` waits for in-flight executions.
    #[serde(default = "default_shutdown_grace", with = "text")]
    pub shutdown_grace: Duration,
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_queue_size() -> usize {
    64
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_size: default_queue_size(),
            log_level: LogLevel::default(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}
