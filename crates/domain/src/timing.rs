//! Timing events: start markers, completed rows, and context merging.

use crate::primitives::TimingIdentifier;
use crate::scope::ScopeFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Free-form payload attached to timing events.
pub type TimingContext = Map<String, Value>;

/// Timing event type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingEventKind {
    /// Open marker awaiting an `end`.
    Start,
    /// Measured duration.
    Completed,
}

impl TimingEventKind {
    /// Stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Completed => "completed",
        }
    }

    /// Parse a stored column value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TimingEventKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Timing row before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimingEvent {
    /// Scope columns written with the row.
    pub attributes: ScopeFilter,
    /// Start or completed.
    pub kind: TimingEventKind,
    /// Correlation id; `None` for direct records.
    pub identifier: Option<TimingIdentifier>,
    /// Start of the measured span.
    pub started_at: DateTime<Utc>,
    /// End of the span; `None` on open starts.
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration; `None` on starts.
    pub duration_ms: Option<i64>,
    /// Payload; `None` when empty.
    pub context: Option<TimingContext>,
}

impl NewTimingEvent {
    /// Open start marker.
    #[must_use]
    pub fn start(
        attributes: ScopeFilter,
        identifier: TimingIdentifier,
        started_at: DateTime<Utc>,
        context: TimingContext,
    ) -> Self {
        Self {
            attributes,
            kind: TimingEventKind::Start,
            identifier: Some(identifier),
            started_at,
            ended_at: None,
            duration_ms: None,
            context: non_empty(context),
        }
    }

    /// Completed row closing `start` at `ended_at`.
    #[must_use]
    pub fn completed_from(
        attributes: ScopeFilter,
        start: &TimingEvent,
        ended_at: DateTime<Utc>,
        end_context: TimingContext,
    ) -> Self {
        Self {
            attributes,
            kind: TimingEventKind::Completed,
            identifier: start.identifier.clone(),
            started_at: start.started_at,
            ended_at: Some(ended_at),
            duration_ms: Some(elapsed_ms(start.started_at, ended_at)),
            context: non_empty(merge_context(start.context.as_ref(), end_context)),
        }
    }

    /// Completed row for a pre-measured duration.
    #[must_use]
    pub fn recorded(
        attributes: ScopeFilter,
        duration_ms: i64,
        at: DateTime<Utc>,
        context: TimingContext,
    ) -> Self {
        Self {
            attributes,
            kind: TimingEventKind::Completed,
            identifier: None,
            started_at: at,
            ended_at: Some(at),
            duration_ms: Some(duration_ms),
            context: non_empty(context),
        }
    }
}

/// Stored timing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Store-assigned id.
    pub id: i64,
    /// Scope columns of the row (as far as the store reports them).
    pub attributes: ScopeFilter,
    /// Start or completed.
    pub kind: TimingEventKind,
    /// Correlation id.
    pub identifier: Option<TimingIdentifier>,
    /// Start of the span.
    pub started_at: DateTime<Utc>,
    /// End of the span.
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration.
    pub duration_ms: Option<i64>,
    /// Payload.
    pub context: Option<TimingContext>,
}

impl TimingEvent {
    /// Attach a store id to a new row.
    #[must_use]
    pub fn from_new(id: i64, event: NewTimingEvent) -> Self {
        Self {
            id,
            attributes: event.attributes,
            kind: event.kind,
            identifier: event.identifier,
            started_at: event.started_at,
            ended_at: event.ended_at,
            duration_ms: event.duration_ms,
            context: event.context,
        }
    }

    /// True for an unclosed start marker.
    #[must_use]
    pub const fn is_open_start(&self) -> bool {
        matches!(self.kind, TimingEventKind::Start) && self.ended_at.is_none()
    }

    /// True for a completed row that carries a duration.
    #[must_use]
    pub const fn is_measured(&self) -> bool {
        matches!(self.kind, TimingEventKind::Completed) && self.duration_ms.is_some()
    }
}

/// Start context overlaid with end context; end keys win.
#[must_use]
pub fn merge_context(start: Option<&TimingContext>, end: TimingContext) -> TimingContext {
    let mut merged = start.cloned().unwrap_or_default();
    merged.extend(end);
    merged
}

/// Wall-clock milliseconds from `start` to `end`; negative when reversed.
#[must_use]
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    end.signed_duration_since(start).num_milliseconds()
}

fn non_empty(context: TimingContext) -> Option<TimingContext> {
    if context.is_empty() {
        None
    } else {
        Some(context)
    }
}
