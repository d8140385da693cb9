//! Counter events and point-in-time reconstruction.

use crate::period::Period;
use crate::primitives::StatName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counter event type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterEventKind {
    /// Relative delta.
    Change,
    /// Absolute reset.
    Set,
}

impl CounterEventKind {
    /// Stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Set => "set",
        }
    }

    /// Parse a stored column value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "change" => Some(Self::Change),
            "set" => Some(Self::Set),
            _ => None,
        }
    }
}

impl fmt::Display for CounterEventKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Counter event before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCounterEvent {
    /// Counter name.
    pub name: StatName,
    /// Change or set.
    pub kind: CounterEventKind,
    /// Delta for `change`, absolute value for `set`.
    pub value: i64,
    /// Event time.
    pub recorded_at: DateTime<Utc>,
}

/// Position of an event in reconstruction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventCursor {
    /// Event time.
    pub recorded_at: DateTime<Utc>,
    /// Insertion id; breaks ties between equal timestamps.
    pub id: i64,
}

/// Stored counter event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEvent {
    /// Store-assigned, increasing id.
    pub id: i64,
    /// Counter name.
    pub name: StatName,
    /// Change or set.
    pub kind: CounterEventKind,
    /// Delta or absolute value.
    pub value: i64,
    /// Event time.
    pub recorded_at: DateTime<Utc>,
}

impl CounterEvent {
    /// Attach a store id to a new event.
    #[must_use]
    pub fn from_new(id: i64, event: NewCounterEvent) -> Self {
        Self {
            id,
            name: event.name,
            kind: event.kind,
            value: event.value,
            recorded_at: event.recorded_at,
        }
    }

    /// Ordering key.
    #[must_use]
    pub const fn cursor(&self) -> EventCursor {
        EventCursor {
            recorded_at: self.recorded_at,
            id: self.id,
        }
    }
}

/// Latest set value (or 0) plus the changes after it.
#[must_use]
pub fn combine(latest_set: Option<&CounterEvent>, changes_after: i64) -> i64 {
    latest_set
        .map_or(0, |event| event.value)
        .saturating_add(changes_after)
}

/// Value of a counter at `as_of`, folded from its events in any order.
///
/// The latest `set` at or before `as_of` wins, then every `change` ordered
/// strictly after that set (by time, then id) and not after `as_of` is added.
#[must_use]
pub fn reconstruct_value<'a, I>(events: I, as_of: DateTime<Utc>) -> i64
where
    I: IntoIterator<Item = &'a CounterEvent>,
{
    let visible: Vec<&CounterEvent> = events
        .into_iter()
        .filter(|event| event.recorded_at <= as_of)
        .collect();

    let latest_set = visible
        .iter()
        .filter(|event| event.kind == CounterEventKind::Set)
        .max_by_key(|event| event.cursor())
        .copied();
    let after = latest_set.map(CounterEvent::cursor);

    let changes = visible
        .iter()
        .filter(|event| event.kind == CounterEventKind::Change)
        .filter(|event| after.is_none_or(|cursor| event.cursor() > cursor))
        .fold(0_i64, |sum, event| sum.saturating_add(event.value));

    combine(latest_set, changes)
}

/// Counter value and movement within one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDataPoint {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Value after every event recorded before `end`.
    pub value: i64,
    /// Sum of positive changes inside the bucket.
    pub increments: i64,
    /// Sum of absolute negative changes inside the bucket.
    pub decrements: i64,
    /// `increments - decrements`.
    pub difference: i64,
}

/// One data point per period, computed from a single counter's events.
#[must_use]
pub fn counter_series(events: &[CounterEvent], periods: &[Period]) -> Vec<CounterDataPoint> {
    periods
        .iter()
        .map(|period| {
            let before_end: Vec<&CounterEvent> = events
                .iter()
                .filter(|event| event.recorded_at < period.end)
                .collect();
            let value = reconstruct_value(before_end.iter().copied(), period.end);

            let (increments, decrements) = events
                .iter()
                .filter(|event| event.kind == CounterEventKind::Change)
                .filter(|event| period.contains(event.recorded_at))
                .fold((0_i64, 0_i64), |(up, down), event| {
                    if event.value >= 0 {
                        (up.saturating_add(event.value), down)
                    } else {
                        (up, down.saturating_add(event.value.saturating_neg()))
                    }
                });

            CounterDataPoint {
                start: period.start,
                end: period.end,
                value,
                increments,
                decrements,
                difference: increments.saturating_sub(decrements),
            }
        })
        .collect()
}
