use std::path::Path;

use crate::error::{Result, SchedulerError};

use super::duration::parse_duration;
use super::types::SchedulerConfig;

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment (loads `.env` first, silently
    /// ignoring a missing file).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(SchedulerError::Config(
                "max_workers must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `TICKWORK_MAX_WORKERS` -> `max_workers`
    /// - `TICKWORK_QUEUE_SIZE` -> `queue_size`
    /// - `TICKWORK_LOG_LEVEL` -> `log_level`
    /// - `TICKWORK_SHUTDOWN_GRACE` -> `shutdown_grace` (e.g. "10s")
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("TICKWORK_MAX_WORKERS") {
            match v.parse::<usize>() {
                Ok(n) => self.max_workers = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid TICKWORK_MAX_WORKERS"),
            }
        }
        if let Some(v) = env_opt("TICKWORK_QUEUE_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.queue_size = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid TICKWORK_QUEUE_SIZE"),
            }
        }
        if let Some(v) = env_opt("TICKWORK_LOG_LEVEL") {
            match v.parse() {
                Ok(level) => self.log_level = level,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring invalid TICKWORK_LOG_LEVEL"),
            }
        }
        if let Some(v) = env_opt("TICKWORK_SHUTDOWN_GRACE") {
            match parse_duration(&v) {
                Some(d) => self.shutdown_grace = d,
                None => tracing::warn!(value = %v, "ignoring invalid TICKWORK_SHUTDOWN_GRACE"),
            }
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}
