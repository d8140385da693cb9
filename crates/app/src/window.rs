//! Query window shared by the counter and timing queries.

use chrono::{DateTime, TimeDelta, Utc};
use entity_stats_domain::{Granularity, Period, generate_periods};
use entity_stats_ports::TimeRange;

/// Default look-back for a fresh query.
pub const DEFAULT_LOOKBACK: TimeDelta = TimeDelta::days(7);

/// `[start, end)` plus bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
    /// Bucket width.
    pub granularity: Granularity,
}

impl QueryWindow {
    /// Daily buckets over the week ending at `now`.
    #[must_use]
    pub fn last_week(now: DateTime<Utc>) -> Self {
        Self {
            start: now - DEFAULT_LOOKBACK,
            end: now,
            granularity: Granularity::Day,
        }
    }

    /// Buckets covering the window.
    #[must_use]
    pub fn periods(&self) -> Vec<Period> {
        generate_periods(self.start, self.end, self.granularity)
    }

    /// Raw bounds, as used for `started_at` filtering.
    #[must_use]
    pub const fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }
}
