//! Start/end timing writer with LIFO matching.

use crate::deps::{StatsDeps, scope_json};
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    NewTimingEvent, ScopeFilter, TimingContext, TimingEvent, TimingIdentifier, TimingTable,
};
use entity_stats_ports::LogFields;
use entity_stats_shared::Result;
use serde_json::Value;

/// Appends timing rows under a fixed set of scope attributes.
#[derive(Debug, Clone)]
pub struct TimingWriter {
    deps: StatsDeps,
    table: TimingTable,
    attributes: ScopeFilter,
}

impl TimingWriter {
    /// Writer for `table`; every row carries `attributes`.
    pub const fn new(deps: StatsDeps, table: TimingTable, attributes: ScopeFilter) -> Self {
        Self {
            deps,
            table,
            attributes,
        }
    }

    /// Scope attributes written with every row.
    #[must_use]
    pub const fn attributes(&self) -> &ScopeFilter {
        &self.attributes
    }

    /// Open a span for `identifier` at `at` (default: now).
    pub async fn start(
        &self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<TimingEvent> {
        let identifier = TimingIdentifier::parse(identifier)?;
        let started_at = self.deps.instant(at);
        let event = self
            .deps
            .store
            .insert_timing_event(
                self.table.clone(),
                NewTimingEvent::start(
                    self.attributes.clone(),
                    identifier.clone(),
                    started_at,
                    context,
                ),
            )
            .await?;

        self.deps.info(
            "stats.timing.started",
            "Timing started",
            self.log_fields(Some(&identifier)),
        );
        Ok(event)
    }

    /// Close the newest open span for `identifier`.
    ///
    /// Returns the duration in milliseconds, or `None` (writing nothing)
    /// when no open start exists. The completed insert and the start update
    /// are separate statements.
    pub async fn end(
        &self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<Option<i64>> {
        let identifier = TimingIdentifier::parse(identifier)?;
        let ended_at = self.deps.instant(at);

        let Some(start) = self
            .deps
            .store
            .find_open_start(self.table.clone(), self.attributes.clone(), identifier.clone())
            .await?
        else {
            self.deps.warn(
                "stats.timing.unmatched",
                "No open start for timing identifier",
                self.log_fields(Some(&identifier)),
            );
            return Ok(None);
        };

        let completed =
            NewTimingEvent::completed_from(self.attributes.clone(), &start, ended_at, context);
        let duration_ms = completed.duration_ms;
        self.deps
            .store
            .insert_timing_event(self.table.clone(), completed)
            .await?;
        self.deps
            .store
            .close_start(self.table.clone(), start.id, ended_at)
            .await?;

        let mut fields = self.log_fields(Some(&identifier));
        fields.insert("duration_ms".into(), Value::from(duration_ms));
        self.deps
            .info("stats.timing.completed", "Timing completed", fields);
        Ok(duration_ms)
    }

    /// Record a pre-measured duration at `at` (default: now).
    pub async fn record(
        &self,
        duration_ms: i64,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<TimingEvent> {
        let at = self.deps.instant(at);
        let event = self
            .deps
            .store
            .insert_timing_event(
                self.table.clone(),
                NewTimingEvent::recorded(self.attributes.clone(), duration_ms, at, context),
            )
            .await?;

        let mut fields = self.log_fields(None);
        fields.insert("duration_ms".into(), Value::from(duration_ms));
        self.deps
            .info("stats.timing.recorded", "Timing recorded", fields);
        Ok(event)
    }

    fn log_fields(&self, identifier: Option<&TimingIdentifier>) -> LogFields {
        let mut fields = LogFields::new();
        fields.insert("table".into(), Value::from(self.table.name().as_str()));
        fields.insert("scope".into(), scope_json(&self.attributes));
        if let Some(identifier) = identifier {
            fields.insert("identifier".into(), Value::from(identifier.as_str()));
        }
        fields
    }
}
