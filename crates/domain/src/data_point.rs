//! Per-bucket timing summaries.

use crate::period::Period;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// One grouped row returned by a store: aggregates for a single bucket key.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodAggregate {
    /// Bucket key as rendered by the store's truncation expression.
    pub key: String,
    /// Row count.
    pub count: i64,
    /// Sum of durations.
    pub total_ms: i64,
    /// Mean duration.
    pub average_ms: f64,
    /// Shortest duration.
    pub min_ms: i64,
    /// Longest duration.
    pub max_ms: i64,
}

/// Ungrouped aggregates over a whole range; zero when no rows match.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationTotals {
    /// Row count.
    pub count: i64,
    /// Sum of durations.
    pub total_ms: i64,
    /// Mean duration.
    pub average_ms: f64,
    /// Shortest duration.
    pub min_ms: i64,
    /// Longest duration.
    pub max_ms: i64,
}

impl DurationTotals {
    /// Fold raw durations into totals.
    #[must_use]
    pub fn from_durations(durations: &[i64]) -> Self {
        let Some((&first, rest)) = durations.split_first() else {
            return Self::default();
        };
        let (total, min, max) = rest.iter().fold(
            (i128::from(first), first, first),
            |(total, min, max), &value| (total + i128::from(value), min.min(value), max.max(value)),
        );
        let count = i64::try_from(durations.len()).unwrap_or(i64::MAX);

        #[expect(clippy::cast_precision_loss, reason = "mean of millisecond durations")]
        let average_ms = total as f64 / durations.len() as f64;

        Self {
            count,
            total_ms: i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX }),
            average_ms,
            min_ms: min,
            max_ms: max,
        }
    }

    /// Same totals tagged with a bucket key.
    #[must_use]
    pub fn into_aggregate(self, key: String) -> PeriodAggregate {
        PeriodAggregate {
            key,
            count: self.count,
            total_ms: self.total_ms,
            average_ms: self.average_ms,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
        }
    }
}

/// Immutable timing summary for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeDataPoint {
    /// Inclusive bucket start.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub start: DateTime<Utc>,
    /// Exclusive bucket end.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub end: DateTime<Utc>,
    /// Completed rows in the bucket.
    pub count: i64,
    /// Sum of durations.
    pub total_duration_ms: i64,
    /// Mean duration, truncated toward zero.
    pub average_duration_ms: i64,
    /// Shortest duration.
    pub min_duration_ms: i64,
    /// Longest duration.
    pub max_duration_ms: i64,
    /// Mean in seconds, two decimals.
    pub average_seconds: f64,
    /// Mean in minutes, two decimals.
    pub average_minutes: f64,
}

impl TimeDataPoint {
    /// All-zero point for an empty bucket.
    #[must_use]
    pub const fn empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            count: 0,
            total_duration_ms: 0,
            average_duration_ms: 0,
            min_duration_ms: 0,
            max_duration_ms: 0,
            average_seconds: 0.0,
            average_minutes: 0.0,
        }
    }

    /// Point for `period`, populated from its aggregate when one exists.
    #[must_use]
    pub fn for_period(period: &Period, aggregate: Option<&PeriodAggregate>) -> Self {
        let Some(aggregate) = aggregate else {
            return Self::empty(period.start, period.end);
        };
        let average = truncate_ms(aggregate.average_ms);

        Self {
            start: period.start,
            end: period.end,
            count: aggregate.count,
            total_duration_ms: aggregate.total_ms,
            average_duration_ms: average,
            min_duration_ms: aggregate.min_ms,
            max_duration_ms: aggregate.max_ms,
            average_seconds: ms_to_seconds(average),
            average_minutes: ms_to_minutes(average),
        }
    }

    /// Mean duration in seconds.
    #[must_use]
    pub fn average_duration_in_seconds(&self) -> f64 {
        ms_to_seconds(self.average_duration_ms)
    }

    /// Mean duration in minutes.
    #[must_use]
    pub fn average_duration_in_minutes(&self) -> f64 {
        ms_to_minutes(self.average_duration_ms)
    }

    /// Total duration in seconds.
    #[must_use]
    pub fn total_duration_in_seconds(&self) -> f64 {
        ms_to_seconds(self.total_duration_ms)
    }

    /// Total duration in minutes.
    #[must_use]
    pub fn total_duration_in_minutes(&self) -> f64 {
        ms_to_minutes(self.total_duration_ms)
    }
}

/// Zero-filled series: one point per period, matched to aggregates by key.
#[must_use]
pub fn merge_time_series(
    periods: &[Period],
    aggregates: Vec<PeriodAggregate>,
) -> Vec<TimeDataPoint> {
    let by_key: HashMap<String, PeriodAggregate> = aggregates
        .into_iter()
        .map(|aggregate| (aggregate.key.clone(), aggregate))
        .collect();

    periods
        .iter()
        .map(|period| TimeDataPoint::for_period(period, by_key.get(&period.key)))
        .collect()
}

/// Round to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean truncated toward zero; non-finite input becomes 0.
#[must_use]
pub fn truncate_ms(average: f64) -> i64 {
    if !average.is_finite() {
        return 0;
    }
    #[expect(clippy::cast_possible_truncation, reason = "truncation toward zero is intended")]
    let truncated = average.trunc() as i64;
    truncated
}

#[expect(clippy::cast_precision_loss, reason = "durations far below 2^52 ms")]
fn ms_to_seconds(ms: i64) -> f64 {
    round2(ms as f64 / 1_000.0)
}

#[expect(clippy::cast_precision_loss, reason = "durations far below 2^52 ms")]
fn ms_to_minutes(ms: i64) -> f64 {
    round2(ms as f64 / 60_000.0)
}

fn serialize_rfc3339<S: Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, false))
}
