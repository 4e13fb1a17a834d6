//! Cron evaluation: expression × reference time → next fire time.
//!
//! Expressions have exactly six fields:
//! `sec min hour day-of-month month day-of-week`. Parsing is delegated to the
//! `cron` crate; the field count is checked here because the crate also
//! accepts a seventh (year) field.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

const FIELD_COUNT: usize = 6;

/// A validated six-field cron expression.
#[derive(Clone)]
pub struct CronExpr {
    source: String,
    schedule: Schedule,
}

impl CronExpr {
    /// Validate and parse an expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let fields = trimmed.split_whitespace().count();
        if fields != FIELD_COUNT {
            return Err(SchedulerError::InvalidSchedule(format!(
                "cron expression '{trimmed}' has {fields} fields, expected {FIELD_COUNT} \
                 (sec min hour day-of-month month day-of-week)"
            )));
        }
        let schedule = Schedule::from_str(trimmed).map_err(|e| {
            SchedulerError::InvalidSchedule(format!("cron expression '{trimmed}': {e}"))
        })?;
        Ok(Self {
            source: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as written (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First fire time strictly after `after`, or `None` if the expression
    /// never fires again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).find(|t| *t > after)
    }

    /// The next `count` fire times strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&after)
            .filter(|t| *t > after)
            .take(count)
            .collect()
    }
}

impl fmt::Debug for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronExpr").field(&self.source).finish()
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpr {}

impl FromStr for CronExpr {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Next fire time of `expr` strictly after `after`.
///
/// Fails with [`SchedulerError::InvalidSchedule`] for malformed expressions
/// and for expressions with no future occurrence.
pub fn next_fire_time(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let cron = CronExpr::parse(expr)?;
    cron.next_after(after).ok_or_else(|| {
        SchedulerError::InvalidSchedule(format!("cron expression '{expr}' never fires after {after}"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Timelike};

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn every_second_is_strictly_later() {
        let t = at(2026, 2, 22, 10, 30, 0);
        let next = next_fire_time("* * * * * *", t).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 30, 1));
    }

    #[test]
    fn exact_boundary_does_not_refire() {
        // Reference time sits exactly on a matching tick.
        let t = at(2026, 2, 22, 8, 0, 0);
        let next = next_fire_time("0 0 8 * * *", t).unwrap();
        assert_eq!(next, at(2026, 2, 23, 8, 0, 0));
    }

    #[test]
    fn sub_second_reference_time() {
        let t = at(2026, 2, 22, 10, 30, 5) + chrono::Duration::milliseconds(400);
        let next = next_fire_time("*/10 * * * * *", t).unwrap();
        assert_eq!(next, at(2026, 2, 22, 10, 30, 10));
        assert!(next > t);
    }

    #[test]
    fn every_fifteen_minutes() {
        let t = at(2026, 2, 22, 10, 2, 0);
        let next = next_fire_time("0 */15 * * * *", t).unwrap();
        assert_eq!(next.minute(), 15);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn weekday_names() {
        // 2026-02-21 is a Saturday.
        let t = at(2026, 2, 21, 12, 0, 0);
        let next = next_fire_time("0 30 9 * * Mon,Tue,Wed,Thu,Fri", t).unwrap();
        assert_eq!(next, at(2026, 2, 23, 9, 30, 0));
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn strictly_increasing_over_many_steps() {
        let cron = CronExpr::parse("*/7 * * * * *").unwrap();
        let mut t = at(2026, 1, 1, 0, 0, 0);
        for _ in 0..200 {
            let next = cron.next_after(t).unwrap();
            assert!(next > t);
            t = next;
        }
    }

    #[test]
    fn upcoming_lists_in_order() {
        let cron = CronExpr::parse("0 0 * * * *").unwrap();
        let times = cron.upcoming(at(2026, 3, 1, 10, 0, 0), 3);
        assert_eq!(
            times,
            vec![
                at(2026, 3, 1, 11, 0, 0),
                at(2026, 3, 1, 12, 0, 0),
                at(2026, 3, 1, 13, 0, 0),
            ]
        );
    }

    #[test]
    fn five_field_expression_rejected() {
        let err = CronExpr::parse("*/15 * * * *").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule(_)));
    }

    #[test]
    fn seven_field_expression_rejected() {
        assert!(CronExpr::parse("0 0 8 * * * 2030").is_err());
    }

    #[test]
    fn malformed_fields_rejected() {
        assert!(CronExpr::parse("61 * * * * *").is_err());
        assert!(CronExpr::parse("a b c d e f").is_err());
        assert!(CronExpr::parse("").is_err());
    }

    #[test]
    fn display_and_equality_use_source() {
        let a = CronExpr::parse("  0 0 8 * * *  ").unwrap();
        let b: CronExpr = "0 0 8 * * *".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0 0 8 * * *");
    }
}
