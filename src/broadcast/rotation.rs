//! Anchor rotation timing.
//!
//! Rotation runs on its own clock, independent of breakdowns, with one
//! rule: nobody changes seats mid-crisis.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracks when the desk last changed hands.
#[derive(Debug, Clone)]
pub struct RotationTimer {
    interval: Duration,
    last_rotation: DateTime<Utc>,
}

impl RotationTimer {
    /// Create a timer; the clock starts at `now`.
    pub fn new(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            last_rotation: now,
        }
    }

    /// Whether a rotation is due. Pure function of elapsed time and the
    /// breakdown-in-progress flag; does not advance the clock.
    pub fn maybe_rotate(&self, now: DateTime<Utc>, in_breakdown: bool) -> bool {
        if in_breakdown {
            return false;
        }
        let elapsed = (now - self.last_rotation).num_milliseconds().max(0) as u128;
        elapsed >= self.interval.as_millis()
    }

    /// Record that a rotation happened at `now`.
    pub fn mark_rotated(&mut self, now: DateTime<Utc>) {
        self.last_rotation = now;
    }

    /// When the desk last changed hands.
    pub fn last_rotation(&self) -> DateTime<Utc> {
        self.last_rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_not_due_before_interval() {
        let now = Utc::now();
        let timer = RotationTimer::new(Duration::from_secs(300), now);

        assert!(!timer.maybe_rotate(now, false));
        assert!(!timer.maybe_rotate(now + ChronoDuration::seconds(299), false));
    }

    #[test]
    fn test_due_at_interval() {
        let now = Utc::now();
        let timer = RotationTimer::new(Duration::from_secs(300), now);

        assert!(timer.maybe_rotate(now + ChronoDuration::seconds(300), false));
        assert!(timer.maybe_rotate(now + ChronoDuration::hours(2), false));
    }

    #[test]
    fn test_never_rotates_during_breakdown() {
        let now = Utc::now();
        let timer = RotationTimer::new(Duration::from_secs(300), now);

        assert!(!timer.maybe_rotate(now + ChronoDuration::hours(2), true));
    }

    #[test]
    fn test_mark_rotated_resets_clock() {
        let now = Utc::now();
        let mut timer = RotationTimer::new(Duration::from_secs(300), now);

        let later = now + ChronoDuration::seconds(400);
        assert!(timer.maybe_rotate(later, false));
        timer.mark_rotated(later);

        assert!(!timer.maybe_rotate(later + ChronoDuration::seconds(299), false));
        assert!(timer.maybe_rotate(later + ChronoDuration::seconds(300), false));
        assert_eq!(timer.last_rotation(), later);
    }
}
