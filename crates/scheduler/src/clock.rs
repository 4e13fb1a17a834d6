//! Wall-clock timestamps derived from tokio's monotonic clock.
//!
//! Anchoring `DateTime<Utc>` to a `tokio::time::Instant` keeps due times,
//! sleeps and reported timestamps on one timeline, including when the tokio
//! clock is paused in tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    origin: Instant,
    origin_wall: DateTime<Utc>,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_wall: Utc::now(),
        }
    }

    /// Current time on the scheduler timeline.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.origin_wall + to_chrono(self.origin.elapsed())
    }

    /// Monotonic instant at which `at` is reached. Past times map to "now".
    pub(crate) fn instant_at(&self, at: DateTime<Utc>) -> Instant {
        let now = Instant::now();
        let wall_now = self.origin_wall + to_chrono(now.duration_since(self.origin));
        match (at - wall_now).to_std() {
            Ok(ahead) => now + ahead,
            Err(_) => now,
        }
    }
}

/// Convert a std duration into a chrono one, saturating on overflow.
fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `at + d`, or `None` when the result falls off the representable timeline.
pub(crate) fn offset(at: DateTime<Utc>, d: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
}

/// Whether `d` can be added to the current time without overflowing.
pub(crate) fn fits_timeline(d: Duration) -> bool {
    offset(Utc::now(), d).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn now_follows_tokio_clock() {
        let clock = Clock::new();
        let start = clock.now();
        tokio::time::advance(Duration::from_secs(30)).await;
        let elapsed = clock.now() - start;
        assert_eq!(elapsed.num_seconds(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn instant_at_maps_future_and_past() {
        let clock = Clock::new();
        let now = Instant::now();
        let target = clock.now() + chrono::Duration::seconds(10);
        let at = clock.instant_at(target);
        assert_eq!(at.duration_since(now), Duration::from_secs(10));

        let past = clock.now() - chrono::Duration::seconds(10);
        assert_eq!(clock.instant_at(past), Instant::now());
    }

    #[test]
    fn offset_rejects_overflow() {
        let now = Utc::now();
        assert_eq!(
            offset(now, Duration::from_secs(5)),
            Some(now + chrono::Duration::seconds(5))
        );
        assert_eq!(offset(now, Duration::from_secs(u64::MAX)), None);
        // Fits a TimeDelta, but lands past the last representable date.
        assert_eq!(offset(now, Duration::from_secs(100_000_000_000 * 86_400)), None);
        assert_eq!(offset(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)), None);

        assert!(fits_timeline(Duration::from_secs(3_600)));
        assert!(!fits_timeline(Duration::from_secs(u64::MAX)));
    }
}
