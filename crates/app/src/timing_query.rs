//! Timing aggregation over zero-filled period buckets.

use crate::deps::{StatsDeps, scope_json};
use crate::window::QueryWindow;
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    DurationTotals, Granularity, ScopeFilter, TimeDataPoint, TimingTable, merge_time_series,
    truncate_ms, truncate_to_micros,
};
use entity_stats_ports::LogFields;
use entity_stats_shared::Result;
use serde_json::Value;

/// Completed-duration statistics for rows matching `attributes`.
///
/// Defaults to daily buckets over the week ending at the clock's now.
#[derive(Debug, Clone)]
pub struct TimingQuery {
    deps: StatsDeps,
    table: TimingTable,
    attributes: ScopeFilter,
    window: QueryWindow,
}

impl TimingQuery {
    /// Query over `table` filtered by `attributes`.
    pub fn new(deps: StatsDeps, table: TimingTable, attributes: ScopeFilter) -> Self {
        let window = QueryWindow::last_week(deps.now());
        Self {
            deps,
            table,
            attributes,
            window,
        }
    }

    /// Scope attributes the query filters on.
    #[must_use]
    pub const fn attributes(&self) -> &ScopeFilter {
        &self.attributes
    }

    /// Set the inclusive start.
    #[must_use]
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.window.start = truncate_to_micros(start);
        self
    }

    /// Set the exclusive end.
    #[must_use]
    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.window.end = truncate_to_micros(end);
        self
    }

    /// Set the bucket width.
    #[must_use]
    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.window.granularity = granularity;
        self
    }

    /// Bucket by minute.
    #[must_use]
    pub fn group_by_minute(self) -> Self {
        self.granularity(Granularity::Minute)
    }

    /// Bucket by hour.
    #[must_use]
    pub fn group_by_hour(self) -> Self {
        self.granularity(Granularity::Hour)
    }

    /// Bucket by day.
    #[must_use]
    pub fn group_by_day(self) -> Self {
        self.granularity(Granularity::Day)
    }

    /// Bucket by ISO week.
    #[must_use]
    pub fn group_by_week(self) -> Self {
        self.granularity(Granularity::Week)
    }

    /// Bucket by month.
    #[must_use]
    pub fn group_by_month(self) -> Self {
        self.granularity(Granularity::Month)
    }

    /// Bucket by year.
    #[must_use]
    pub fn group_by_year(self) -> Self {
        self.granularity(Granularity::Year)
    }

    /// Current window.
    #[must_use]
    pub const fn window(&self) -> &QueryWindow {
        &self.window
    }

    /// One data point per bucket; empty buckets are all-zero.
    #[tracing::instrument(
        name = "stats.timing.series",
        skip_all,
        fields(table = %self.table.name(), granularity = %self.window.granularity)
    )]
    pub async fn get(&self) -> Result<Vec<TimeDataPoint>> {
        let periods = self.window.periods();
        let result = self
            .deps
            .store
            .aggregate_by_period(
                self.table.clone(),
                self.attributes.clone(),
                self.window.range(),
                self.window.granularity,
            )
            .await
            .map(|aggregates| merge_time_series(&periods, aggregates));

        self.deps
            .observe_query("timing.series", self.log_fields(), result)
    }

    /// Mean duration over the window, truncated; 0 when empty.
    pub async fn average(&self) -> Result<i64> {
        Ok(truncate_ms(self.totals("timing.average").await?.average_ms))
    }

    /// Completed rows in the window.
    pub async fn count(&self) -> Result<i64> {
        Ok(self.totals("timing.count").await?.count)
    }

    /// Shortest duration in the window; 0 when empty.
    pub async fn min(&self) -> Result<i64> {
        Ok(self.totals("timing.min").await?.min_ms)
    }

    /// Longest duration in the window; 0 when empty.
    pub async fn max(&self) -> Result<i64> {
        Ok(self.totals("timing.max").await?.max_ms)
    }

    #[tracing::instrument(
        name = "stats.timing.totals",
        skip(self),
        fields(table = %self.table.name())
    )]
    async fn totals(&self, operation: &str) -> Result<DurationTotals> {
        let result = self
            .deps
            .store
            .aggregate_totals(self.table.clone(), self.attributes.clone(), self.window.range())
            .await;
        self.deps
            .observe_query(operation, self.log_fields(), result)
    }

    fn log_fields(&self) -> LogFields {
        let mut fields = LogFields::new();
        fields.insert("table".into(), Value::from(self.table.name().as_str()));
        fields.insert("scope".into(), scope_json(&self.attributes));
        fields.insert("granularity".into(), Value::from(self.window.granularity.as_str()));
        fields
    }
}
