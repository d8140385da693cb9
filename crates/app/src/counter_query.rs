//! Per-period counter series.

use crate::deps::{StatsDeps, scope_json};
use crate::window::QueryWindow;
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    CounterDataPoint, Granularity, ScopeFilter, StatFamily, StatName, counter_series,
    truncate_to_micros,
};
use entity_stats_ports::LogFields;
use entity_stats_shared::Result;
use serde_json::Value;

/// Counter values and movements bucketed over a window (default: daily, last week).
#[derive(Debug, Clone)]
pub struct CounterQuery {
    deps: StatsDeps,
    family: StatFamily,
    scope: ScopeFilter,
    name: StatName,
    window: QueryWindow,
}

impl CounterQuery {
    /// Query for `name` under `scope`, windowed from the clock.
    pub fn new(deps: StatsDeps, family: StatFamily, scope: ScopeFilter, name: StatName) -> Self {
        let window = QueryWindow::last_week(deps.now());
        Self {
            deps,
            family,
            scope,
            name,
            window,
        }
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

    /// One data point per period.
    #[tracing::instrument(
        name = "stats.counter.series",
        skip_all,
        fields(family = %self.family.table(), granularity = %self.window.granularity)
    )]
    pub async fn get(&self) -> Result<Vec<CounterDataPoint>> {
        let periods = self.window.periods();
        let Some(last) = periods.last() else {
            return Ok(Vec::new());
        };

        let result = self
            .deps
            .store
            .list_counter_events(
                self.family.clone(),
                self.scope.clone(),
                self.name.clone(),
                last.end,
            )
            .await
            .map(|events| counter_series(&events, &periods));

        self.deps
            .observe_query("counter.series", self.log_fields(), result)
    }

    fn log_fields(&self) -> LogFields {
        let mut fields = LogFields::new();
        fields.insert("family".into(), Value::from(self.family.table().as_str()));
        fields.insert("name".into(), Value::from(self.name.as_str()));
        fields.insert("scope".into(), scope_json(&self.scope));
        fields
    }
}
