//! Period bucketing: truncation, stepping, and canonical bucket keys.
//!
//! Every granularity has one textual key format. Store adapters must render
//! the exact same key from `started_at` so grouped rows land in the bucket
//! the generator produced. Weeks use ISO-8601 numbering (Monday start, ISO
//! week-based year) on both sides.

use chrono::{DateTime, Datelike, Months, NaiveDate, SubsecRound, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One calendar day.
    #[default]
    Day,
    /// One ISO week (Monday to Monday).
    Week,
    /// One calendar month.
    Month,
    /// One calendar year.
    Year,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Self; 6] = [
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Year,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// `chrono` format string producing the bucket key.
    #[must_use]
    pub const fn key_format(self) -> &'static str {
        match self {
            Self::Minute => "%Y-%m-%d %H:%M",
            Self::Hour => "%Y-%m-%d %H",
            Self::Day => "%Y-%m-%d",
            Self::Week => "%G%V",
            Self::Month => "%Y-%m",
            Self::Year => "%Y",
        }
    }

    /// Truncate `at` down to the start of its bucket.
    #[must_use]
    pub fn truncate(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let truncated = match self {
            Self::Minute => date.and_hms_opt(at.hour(), at.minute(), 0),
            Self::Hour => date.and_hms_opt(at.hour(), 0, 0),
            Self::Day => date.and_hms_opt(0, 0, 0),
            Self::Week => date
                .checked_sub_signed(TimeDelta::days(i64::from(
                    date.weekday().num_days_from_monday(),
                )))
                .and_then(|monday| monday.and_hms_opt(0, 0, 0)),
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .and_then(|first| first.and_hms_opt(0, 0, 0)),
            Self::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)
                .and_then(|first| first.and_hms_opt(0, 0, 0)),
        };
        truncated.map_or(at, |naive| naive.and_utc())
    }

    /// Step one bucket forward; `None` past the representable range.
    #[must_use]
    pub fn advance(self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Minute => at.checked_add_signed(TimeDelta::minutes(1)),
            Self::Hour => at.checked_add_signed(TimeDelta::hours(1)),
            Self::Day => at.checked_add_signed(TimeDelta::days(1)),
            Self::Week => at.checked_add_signed(TimeDelta::weeks(1)),
            Self::Month => at.checked_add_months(Months::new(1)),
            Self::Year => at.checked_add_months(Months::new(12)),
        }
    }

    /// Canonical bucket key for the bucket containing `at`.
    #[must_use]
    pub fn key(self, at: DateTime<Utc>) -> String {
        at.format(self.key_format()).to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Unknown granularity name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown granularity `{input}` (expected minute, hour, day, week, month, or year)")]
pub struct ParseGranularityError {
    /// Rejected input.
    pub input: String,
}

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|granularity| granularity.as_str() == normalized)
            .ok_or_else(|| ParseGranularityError {
                input: input.to_owned(),
            })
    }
}

/// Half-open bucket `[start, end)` with its canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Canonical key (see [`Granularity::key`]).
    pub key: String,
}

impl Period {
    /// True when `at` falls inside the bucket.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Lazy bucket sequence covering `[start, end)`.
///
/// Always yields at least one bucket, then continues while the next bucket
/// start is strictly before `end`.
#[derive(Debug, Clone)]
pub struct Periods {
    granularity: Granularity,
    cursor: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    emitted: bool,
}

impl Iterator for Periods {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        let start = self.cursor?;
        if self.emitted && start >= self.end {
            self.cursor = None;
            return None;
        }
        let next = self.granularity.advance(start);
        self.cursor = next;
        self.emitted = true;
        Some(Period {
            start,
            end: next.unwrap_or(DateTime::<Utc>::MAX_UTC),
            key: self.granularity.key(start),
        })
    }
}

/// Buckets for `[start, end)` at `granularity`.
#[must_use]
pub fn periods(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> Periods {
    Periods {
        granularity,
        cursor: Some(granularity.truncate(start)),
        end,
        emitted: false,
    }
}

/// Collected form of [`periods`].
#[must_use]
pub fn generate_periods(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> Vec<Period> {
    periods(start, end, granularity).collect()
}

/// Drop sub-microsecond precision.
///
/// Stores keep microseconds, so every instant that is written or compared
/// passes through here first.
#[must_use]
pub fn truncate_to_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[test]
    fn one_day_window_yields_two_day_buckets() {
        let now = at(2025, 3, 14, 15, 30, 0);
        let buckets = generate_periods(now - TimeDelta::days(1), now, Granularity::Day);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start, at(2025, 3, 13, 0, 0, 0));
        assert_eq!(buckets[0].end, at(2025, 3, 14, 0, 0, 0));
        assert_eq!(buckets[0].key, "2025-03-13");
        assert_eq!(buckets[1].key, "2025-03-14");
    }

    #[test]
    fn three_day_window_yields_four_buckets() {
        let now = at(2025, 3, 14, 15, 30, 0);
        assert_eq!(
            generate_periods(now - TimeDelta::days(3), now, Granularity::Day).len(),
            4
        );
    }

    #[test]
    fn hour_window_on_the_hour_yields_three_buckets() {
        let now = at(2025, 3, 14, 12, 0, 0);
        let buckets = generate_periods(now - TimeDelta::hours(3), now, Granularity::Hour);

        let keys: Vec<&str> = buckets.iter().map(|period| period.key.as_str()).collect();
        assert_eq!(keys, vec!["2025-03-14 09", "2025-03-14 10", "2025-03-14 11"]);
    }

    #[test]
    fn instants_are_cut_to_whole_microseconds() {
        let base = at(2025, 3, 14, 12, 0, 0);
        let inside = base + TimeDelta::nanoseconds(1_400);

        assert_eq!(truncate_to_micros(inside), base + TimeDelta::microseconds(1));
        assert_eq!(
            truncate_to_micros(base - TimeDelta::nanoseconds(600)),
            base - TimeDelta::microseconds(1)
        );
        let sub_milli = base + TimeDelta::microseconds(400);
        assert_eq!(truncate_to_micros(sub_milli), sub_milli);
    }

    #[test]
    fn empty_range_still_yields_one_bucket() {
        let now = at(2025, 3, 14, 12, 0, 0);
        let buckets = generate_periods(now, now, Granularity::Day);
        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].contains(now));
    }

    #[test]
    fn week_buckets_start_on_monday_with_iso_keys() {
        // 2024-12-31 is a Tuesday in ISO week 2025-W01.
        let tuesday = at(2024, 12, 31, 8, 0, 0);
        assert_eq!(Granularity::Week.truncate(tuesday), at(2024, 12, 30, 0, 0, 0));
        assert_eq!(Granularity::Week.key(tuesday), "202501");
        // 2021-01-03 is a Sunday still in ISO week 2020-W53.
        assert_eq!(Granularity::Week.key(at(2021, 1, 3, 23, 59, 0)), "202053");
    }

    #[test]
    fn month_and_year_keys_and_steps() {
        let moment = at(2025, 1, 31, 10, 0, 0);
        let month = Granularity::Month.truncate(moment);
        assert_eq!(month, at(2025, 1, 1, 0, 0, 0));
        assert_eq!(Granularity::Month.advance(month), Some(at(2025, 2, 1, 0, 0, 0)));
        assert_eq!(Granularity::Month.key(moment), "2025-01");
        assert_eq!(Granularity::Year.key(moment), "2025");
        assert_eq!(Granularity::Minute.key(moment), "2025-01-31 10:00");
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Hour".parse::<Granularity>(), Ok(Granularity::Hour));
        assert!("fortnight".parse::<Granularity>().is_err());
    }

    fn granularity_strategy() -> impl Strategy<Value = Granularity> {
        prop::sample::select(Granularity::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn periods_are_contiguous_and_cover_the_range(
            start_secs in 946_684_800_i64..1_893_456_000,
            span_secs in 0_i64..5_000_000,
            granularity in granularity_strategy(),
        ) {
            let start = DateTime::<Utc>::from_timestamp(start_secs, 0).unwrap_or_default();
            let end = start + TimeDelta::seconds(span_secs);
            let buckets = generate_periods(start, end, granularity);

            prop_assert!(!buckets.is_empty());
            prop_assert!(buckets[0].contains(start));
            for pair in buckets.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
                prop_assert_ne!(&pair[0].key, &pair[1].key);
            }
            for bucket in &buckets {
                prop_assert_eq!(granularity.key(bucket.start), bucket.key.clone());
                prop_assert_eq!(granularity.truncate(bucket.start), bucket.start);
            }
            if let Some(last) = buckets.last() {
                prop_assert!(last.end >= end);
            }
        }
    }
}
