//! Event store boundary contracts.
//!
//! Counter and timing stats live in independent tables, so they get
//! independent ports. Adapters receive validated table descriptors and
//! scope filters; every value they interpolate is a `SqlIdentifier`.

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    CounterEvent, DurationTotals, EventCursor, Granularity, NewCounterEvent, NewTimingEvent,
    PeriodAggregate, ScopeFilter, StatFamily, StatName, TimingEvent, TimingIdentifier,
    TimingTable,
};
use entity_stats_shared::Result;

/// Half-open `started_at` window for timing aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

/// Append-only counter event log, one table per stat family.
pub trait CounterEventStore: Send + Sync {
    /// Create the family table and index when missing.
    fn ensure_counter_table(&self, family: StatFamily) -> BoxFuture<'_, Result<()>>;

    /// Append one event under `scope`.
    fn insert_counter_event(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        event: NewCounterEvent,
    ) -> BoxFuture<'_, Result<CounterEvent>>;

    /// Most recent `set` with `recorded_at <= as_of` (ties by highest id).
    fn latest_set(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        as_of: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<CounterEvent>>>;

    /// Sum of `change` values ordered after `after` (all when `None`) with
    /// `recorded_at <= until`.
    fn sum_changes(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        after: Option<EventCursor>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<i64>>;

    /// Events with `recorded_at < before`, oldest first.
    fn list_counter_events(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<CounterEvent>>>;
}

/// Timing event table with start/end matching and grouped aggregation.
pub trait TimingEventStore: Send + Sync {
    /// Create the timing table when missing.
    fn ensure_timing_table(&self, table: TimingTable) -> BoxFuture<'_, Result<()>>;

    /// Append one row.
    fn insert_timing_event(
        &self,
        table: TimingTable,
        event: NewTimingEvent,
    ) -> BoxFuture<'_, Result<TimingEvent>>;

    /// Newest unclosed start for `identifier` under `scope`
    /// (`started_at DESC, id DESC`).
    fn find_open_start(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        identifier: TimingIdentifier,
    ) -> BoxFuture<'_, Result<Option<TimingEvent>>>;

    /// Set `ended_at` on a start row.
    fn close_start(
        &self,
        table: TimingTable,
        id: i64,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Completed durations in `range`, grouped by the granularity bucket key.
    fn aggregate_by_period(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        range: TimeRange,
        granularity: Granularity,
    ) -> BoxFuture<'_, Result<Vec<PeriodAggregate>>>;

    /// Completed durations in `range`, ungrouped.
    fn aggregate_totals(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<DurationTotals>>;

    /// Every row matching `scope`, in insertion order.
    fn list_timing_events(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
    ) -> BoxFuture<'_, Result<Vec<TimingEvent>>>;
}

/// Store implementing both event logs.
pub trait StatsStore: CounterEventStore + TimingEventStore {}

impl<T: CounterEventStore + TimingEventStore + ?Sized> StatsStore for T {}
