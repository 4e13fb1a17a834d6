use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use tickwork_scheduler::{parse_duration, SchedulerConfig, Task, TaskConfig};

use crate::command::CommandSpec;

/// A job file: scheduler settings plus the commands to schedule.
///
/// ```toml
/// [scheduler]
/// max_workers = 4
/// shutdown_grace = "10s"
///
/// [[tasks]]
/// id = "cleanup"
/// interval = "5m"
/// command = "find"
/// args = ["/tmp/cache", "-mtime", "+1", "-delete"]
/// max_retries = 2
/// retry_interval = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub tasks: Vec<JobSpec>,
}

/// One `[[tasks]]` entry. Exactly one of `interval`, `cron`, `delay` or
/// `once` must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub name: Option<String>,
    pub interval: Option<String>,
    pub cron: Option<String>,
    pub delay: Option<String>,
    #[serde(default)]
    pub once: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(flatten)]
    pub config: TaskConfig,
}

impl JobFile {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut file: Self = toml::from_str(toml_str).context("invalid job file")?;
        file.scheduler.apply_env_overrides();
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        let file = Self::from_toml(&content)
            .with_context(|| format!("failed to load job file {}", path.display()))?;
        debug!(
            path = %path.display(),
            tasks = file.tasks.len(),
            "Loaded job file"
        );
        Ok(file)
    }

    /// Check scheduler settings, id uniqueness and every schedule.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        let mut seen = std::collections::HashSet::new();
        for spec in &self.tasks {
            if !seen.insert(spec.id.as_str()) {
                bail!("duplicate task id '{}'", spec.id);
            }
            spec.build_task()
                .with_context(|| format!("task '{}'", spec.id))?;
        }
        Ok(())
    }
}

impl JobSpec {
    /// Build a scheduler task that runs this entry's command.
    pub fn build_task(&self) -> Result<Task> {
        if self.command.trim().is_empty() {
            bail!("command must not be empty");
        }
        let command = CommandSpec::new(&self.command, &self.args);
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let task = Task::new(&self.id, name, move |ctx| {
            let command = command.clone();
            async move { command.run(ctx).await }
        });

        match (&self.interval, &self.cron, &self.delay, self.once) {
            (Some(every), None, None, false) => task.set_interval(duration("interval", every)?)?,
            (None, Some(expr), None, false) => task.set_cron(expr)?,
            (None, None, Some(delay), false) => task.set_delay(duration("delay", delay)?)?,
            (None, None, None, true) => task.set_once()?,
            (None, None, None, false) => {
                bail!("no schedule: set one of interval, cron, delay or once")
            }
            _ => bail!("conflicting schedules: set only one of interval, cron, delay or once"),
        }
        task.set_config(self.config.clone())?;
        Ok(task)
    }
}

fn duration(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).with_context(|| format!("invalid {field} '{value}'"))
}
