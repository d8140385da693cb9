//! In-memory adapter implementations for port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests of the application services
//! - Deterministic contract tests for the store ports
//! - Local experimentation without a database
//!
//! Grouping keys are computed client-side with `Granularity::key`, so the
//! store agrees with the period generator by construction.

use chrono::{DateTime, Utc};
use entity_stats_domain::{
    CounterEvent, CounterEventKind, DurationTotals, EventCursor, Granularity, NewCounterEvent,
    NewTimingEvent, PeriodAggregate, ScopeFilter, StatFamily, StatName, TimingEvent,
    TimingIdentifier, TimingTable,
};
use entity_stats_ports::{
    BoxFuture, CounterEventStore, LogEvent, LogFields, LoggerPort, TimeRange, TimingEventStore,
};
use entity_stats_shared::{ErrorEnvelope, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Logger capturing every event (child loggers share the buffer).
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl RecordingLogger {
    /// Snapshot of captured events, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Captured event names, oldest first.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event.into_string())
            .collect()
    }

    /// Number of captured events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.event.as_ref() == name)
            .count()
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base_fields.is_empty() {
            let mut fields = self.base_fields.clone();
            fields.extend(event.fields.take().unwrap_or_default());
            event.fields = Some(fields);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields,
        })
    }
}

#[derive(Debug, Clone)]
struct StoredCounter {
    scope: ScopeFilter,
    event: CounterEvent,
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    counters: HashMap<String, Vec<StoredCounter>>,
    timings: HashMap<String, Vec<TimingEvent>>,
    failure: Option<ErrorEnvelope>,
}

impl StoreState {
    fn check(&self) -> Result<()> {
        self.failure.clone().map_or(Ok(()), Err)
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn counter_rows<'a>(
        &'a self,
        family: &StatFamily,
        scope: &'a ScopeFilter,
        name: &'a StatName,
    ) -> impl Iterator<Item = &'a CounterEvent> + 'a {
        self.counters
            .get(family.table().as_str())
            .into_iter()
            .flatten()
            .filter(move |row| scope.matches(&row.scope) && &row.event.name == name)
            .map(|row| &row.event)
    }

    fn timing_rows<'a>(
        &'a self,
        table: &TimingTable,
        scope: &'a ScopeFilter,
    ) -> impl Iterator<Item = &'a TimingEvent> + 'a {
        self.timings
            .get(table.name().as_str())
            .into_iter()
            .flatten()
            .filter(move |event| scope.matches(&event.attributes))
    }

    fn measured_durations<'a>(
        &'a self,
        table: &TimingTable,
        scope: &'a ScopeFilter,
        range: TimeRange,
    ) -> impl Iterator<Item = (DateTime<Utc>, i64)> + 'a {
        self.timing_rows(table, scope)
            .filter(move |event| event.started_at >= range.start && event.started_at < range.end)
            .filter_map(|event| {
                event
                    .is_measured()
                    .then_some(event.duration_ms)
                    .flatten()
                    .map(|duration| (event.started_at, duration))
            })
    }
}

/// Event store held in process memory; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatsStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStatsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `error`.
    pub async fn fail_with(&self, error: ErrorEnvelope) {
        self.state.write().await.failure = Some(error);
    }

    /// Stop failing.
    pub async fn clear_failure(&self) {
        self.state.write().await.failure = None;
    }

    /// Every counter row in `table` with the scope it was written under.
    pub async fn counter_rows(&self, table: &str) -> Vec<(ScopeFilter, CounterEvent)> {
        self.state
            .read()
            .await
            .counters
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|row| (row.scope.clone(), row.event.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every timing row in `table`, in insertion order.
    pub async fn timing_rows(&self, table: &str) -> Vec<TimingEvent> {
        self.state
            .read()
            .await
            .timings
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

impl CounterEventStore for InMemoryStatsStore {
    fn ensure_counter_table(&self, family: StatFamily) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check()?;
            state
                .counters
                .entry(family.table().as_str().to_owned())
                .or_default();
            Ok(())
        })
    }

    fn insert_counter_event(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        event: NewCounterEvent,
    ) -> BoxFuture<'_, Result<CounterEvent>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check()?;
            let stored = CounterEvent::from_new(state.allocate_id(), event);
            state
                .counters
                .entry(family.table().as_str().to_owned())
                .or_default()
                .push(StoredCounter {
                    scope,
                    event: stored.clone(),
                });
            Ok(stored)
        })
    }

    fn latest_set(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        as_of: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<CounterEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            Ok(state
                .counter_rows(&family, &scope, &name)
                .filter(|event| event.kind == CounterEventKind::Set && event.recorded_at <= as_of)
                .max_by_key(|event| event.cursor())
                .cloned())
        })
    }

    fn sum_changes(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        after: Option<EventCursor>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            Ok(state
                .counter_rows(&family, &scope, &name)
                .filter(|event| event.kind == CounterEventKind::Change)
                .filter(|event| event.recorded_at <= until)
                .filter(|event| after.is_none_or(|cursor| event.cursor() > cursor))
                .fold(0_i64, |sum, event| sum.saturating_add(event.value)))
        })
    }

    fn list_counter_events(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        name: StatName,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<CounterEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            let mut events: Vec<CounterEvent> = state
                .counter_rows(&family, &scope, &name)
                .filter(|event| event.recorded_at < before)
                .cloned()
                .collect();
            events.sort_by_key(CounterEvent::cursor);
            Ok(events)
        })
    }
}

impl TimingEventStore for InMemoryStatsStore {
    fn ensure_timing_table(&self, table: TimingTable) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check()?;
            state
                .timings
                .entry(table.name().as_str().to_owned())
                .or_default();
            Ok(())
        })
    }

    fn insert_timing_event(
        &self,
        table: TimingTable,
        event: NewTimingEvent,
    ) -> BoxFuture<'_, Result<TimingEvent>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check()?;
            let stored = TimingEvent::from_new(state.allocate_id(), event);
            state
                .timings
                .entry(table.name().as_str().to_owned())
                .or_default()
                .push(stored.clone());
            Ok(stored)
        })
    }

    fn find_open_start(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        identifier: TimingIdentifier,
    ) -> BoxFuture<'_, Result<Option<TimingEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            Ok(state
                .timing_rows(&table, &scope)
                .filter(|event| event.is_open_start())
                .filter(|event| event.identifier.as_ref() == Some(&identifier))
                .max_by_key(|event| (event.started_at, event.id))
                .cloned())
        })
    }

    fn close_start(
        &self,
        table: TimingTable,
        id: i64,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.check()?;
            if let Some(event) = state
                .timings
                .get_mut(table.name().as_str())
                .and_then(|rows| rows.iter_mut().find(|event| event.id == id))
            {
                event.ended_at = Some(ended_at);
            }
            Ok(())
        })
    }

    fn aggregate_by_period(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        range: TimeRange,
        granularity: Granularity,
    ) -> BoxFuture<'_, Result<Vec<PeriodAggregate>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            let mut buckets: BTreeMap<String, Vec<i64>> = BTreeMap::new();
            for (started_at, duration) in state.measured_durations(&table, &scope, range) {
                buckets
                    .entry(granularity.key(started_at))
                    .or_default()
                    .push(duration);
            }
            Ok(buckets
                .into_iter()
                .map(|(key, durations)| {
                    DurationTotals::from_durations(&durations).into_aggregate(key)
                })
                .collect())
        })
    }

    fn aggregate_totals(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<DurationTotals>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            let durations: Vec<i64> = state
                .measured_durations(&table, &scope, range)
                .map(|(_, duration)| duration)
                .collect();
            Ok(DurationTotals::from_durations(&durations))
        })
    }

    fn list_timing_events(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
    ) -> BoxFuture<'_, Result<Vec<TimingEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state.check()?;
            Ok(state.timing_rows(&table, &scope).cloned().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_logger_children_share_the_buffer() {
        let logger = RecordingLogger::default();
        let child = logger.child(LogFields::from([("family".into(), json!("user_stats"))]));

        child.info("stats.counter.recorded", "recorded", None);
        logger.warn("stats.timing.unmatched", "no open start", None);

        assert_eq!(
            logger.event_names(),
            vec!["stats.counter.recorded", "stats.timing.unmatched"]
        );
        let first = &logger.events()[0];
        assert_eq!(
            first.fields.as_ref().unwrap().get("family"),
            Some(&json!("user_stats"))
        );
        assert_eq!(logger.count("stats.timing.unmatched"), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_returned_until_cleared() {
        let store = InMemoryStatsStore::new();
        let table = TimingTable::new("time_stats_events").unwrap();

        store.fail_with(ErrorEnvelope::store("memory", "offline")).await;
        let error = store.ensure_timing_table(table.clone()).await.unwrap_err();
        assert_eq!(error.message, "offline");

        store.clear_failure().await;
        store.ensure_timing_table(table).await.unwrap();
    }
}
