//! Timing streams addressed by a stat name.

use crate::deps::StatsDeps;
use crate::timing_query::TimingQuery;
use crate::timing_writer::TimingWriter;
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    ColumnKind, ScopeFilter, ScopeValue, StatName, TimingContext, TimingEvent, TimingTable,
};
use entity_stats_shared::Result;

/// Scope column holding the stat name.
pub const NAME_COLUMN: &str = "name";

/// Timing table with the `name` scope column.
pub fn named_timing_table(table: &str) -> Result<TimingTable> {
    Ok(TimingTable::new(table)?.with_column(NAME_COLUMN, ColumnKind::Text)?)
}

/// A timing stat scoped by `{name: <stat name>}` plus optional extra attributes.
#[derive(Debug, Clone)]
pub struct NamedTimingStat {
    deps: StatsDeps,
    table: TimingTable,
    name: StatName,
    attributes: ScopeFilter,
}

impl NamedTimingStat {
    /// Stat `name` stored in `table`.
    pub fn new(deps: StatsDeps, table: TimingTable, name: &str) -> Result<Self> {
        let name = StatName::parse(name)?;
        let attributes =
            ScopeFilter::new().try_with(NAME_COLUMN, Some(ScopeValue::from(name.as_str())))?;
        Ok(Self {
            deps,
            table,
            name,
            attributes,
        })
    }

    /// Narrow the stream with another attribute (e.g. an owner column).
    pub fn with_attribute(self, column: &str, value: Option<ScopeValue>) -> Result<Self> {
        Ok(Self {
            attributes: self.attributes.try_with(column, value)?,
            ..self
        })
    }

    /// Stat name.
    #[must_use]
    pub const fn name(&self) -> &StatName {
        &self.name
    }

    /// Scope attributes shared by the writer and the query.
    #[must_use]
    pub const fn attributes(&self) -> &ScopeFilter {
        &self.attributes
    }

    /// Writer bound to this stat.
    #[must_use]
    pub fn writer(&self) -> TimingWriter {
        TimingWriter::new(self.deps.clone(), self.table.clone(), self.attributes.clone())
    }

    /// Query bound to this stat.
    #[must_use]
    pub fn query(&self) -> TimingQuery {
        TimingQuery::new(self.deps.clone(), self.table.clone(), self.attributes.clone())
    }

    /// See [`TimingWriter::start`].
    pub async fn start(
        &self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<TimingEvent> {
        self.writer().start(identifier, at, context).await
    }

    /// See [`TimingWriter::end`].
    pub async fn end(
        &self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<Option<i64>> {
        self.writer().end(identifier, at, context).await
    }

    /// See [`TimingWriter::record`].
    pub async fn record(
        &self,
        duration_ms: i64,
        at: Option<DateTime<Utc>>,
        context: TimingContext,
    ) -> Result<TimingEvent> {
        self.writer().record(duration_ms, at, context).await
    }
}
