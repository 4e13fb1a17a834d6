//! Scheduler configuration.
//!
//! Parsed from TOML (`[scheduler]` table or a standalone file) with
//! `TICKWORK_*` environment overrides. Durations accept the compact text
//! form understood by [`parse_duration`].

mod duration;
mod loading;
mod types;

#[cfg(test)]
mod tests;

pub use self::duration::{format_duration, parse_duration};
pub use self::types::{LogLevel, SchedulerConfig};

pub(crate) use self::duration::{text, text_opt};
