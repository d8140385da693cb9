use super::sql::{self, Dialect, SQLITE_TIMESTAMP_FORMAT, SqlValue, Statement};
use super::{decode_context, decode_counter_kind, decode_timing_kind, encode_context, store_error};
use chrono::{DateTime, NaiveDateTime, Utc};
use entity_stats_domain::{
    CounterEvent, DurationTotals, EventCursor, Granularity, NewCounterEvent, NewTimingEvent,
    PeriodAggregate, ScopeFilter, StatFamily, StatName, TimingEvent, TimingIdentifier,
    TimingTable,
};
use entity_stats_ports::{BoxFuture, CounterEventStore, TimeRange, TimingEventStore};
use entity_stats_shared::{ErrorEnvelope, Result};
use rusqlite::types::{Null, ToSqlOutput};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params_from_iter};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

const BACKEND: &str = "sqlite";
const DIALECT: Dialect = Dialect::Sqlite;

/// SQLite-backed store for both event logs.
///
/// Each call opens its own WAL-mode connection on a blocking thread, so the
/// store is cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct SqliteStatsStore {
    path: PathBuf,
}

impl SqliteStatsStore {
    /// Store backed by the database file at `path` (created on first use).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        spawn_blocking(move || {
            let conn = open_connection(&path)?;
            operation(&conn)
        })
        .await
        .map_err(|error| sqlite_error(&format!("task failed: {error}")))?
    }
}

impl CounterEventStore for SqliteStatsStore {
    fn ensure_counter_table(&self, family: StatFamily) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let ddl = sql::counter_table_ddl(DIALECT, &family).join(";\n");
            self.run(move |conn| {
                conn.execute_batch(&ddl)
                    .map_err(|error| sqlite_error(&format!("schema failed: {error}")))
            })
            .await
        })
    }

    fn insert_counter_event(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        event: NewCounterEvent,
    ) -> BoxFuture<'_, Result<CounterEvent>> {
        Box::pin(async move {
            let statement = sql::insert_counter(DIALECT, &family, &scope, &event);
            self.run(move |conn| {
                execute(conn, &statement, "insert")?;
                Ok(CounterEvent::from_new(conn.last_insert_rowid(), event))
            })
            .await
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
            let statement = sql::latest_set(DIALECT, &family, &scope, &name, as_of);
            self.run(move |conn| {
                let raw = conn
                    .query_row(
                        &statement.sql,
                        params_from_iter(statement.binds.iter()),
                        RawCounterRow::read,
                    )
                    .optional()
                    .map_err(|error| sqlite_error(&format!("query failed: {error}")))?;
                raw.map(RawCounterRow::decode).transpose()
            })
            .await
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
            let statement = sql::sum_changes(DIALECT, &family, &scope, &name, after, until);
            self.run(move |conn| {
                conn.query_row(
                    &statement.sql,
                    params_from_iter(statement.binds.iter()),
                    |row| row.get::<_, i64>(0),
                )
                .map_err(|error| sqlite_error(&format!("query failed: {error}")))
            })
            .await
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
            let statement = sql::list_counter_events(DIALECT, &family, &scope, &name, before);
            self.run(move |conn| {
                query_all(conn, &statement, RawCounterRow::read)?
                    .into_iter()
                    .map(RawCounterRow::decode)
                    .collect()
            })
            .await
        })
    }
}

impl TimingEventStore for SqliteStatsStore {
    fn ensure_timing_table(&self, table: TimingTable) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let ddl = sql::timing_table_ddl(DIALECT, &table).join(";\n");
            self.run(move |conn| {
                conn.execute_batch(&ddl)
                    .map_err(|error| sqlite_error(&format!("schema failed: {error}")))
            })
            .await
        })
    }

    fn insert_timing_event(
        &self,
        table: TimingTable,
        event: NewTimingEvent,
    ) -> BoxFuture<'_, Result<TimingEvent>> {
        Box::pin(async move {
            let context = encode_context(BACKEND, event.context.as_ref())?;
            let statement = sql::insert_timing(DIALECT, &table, &event, context);
            self.run(move |conn| {
                execute(conn, &statement, "insert")?;
                Ok(TimingEvent::from_new(conn.last_insert_rowid(), event))
            })
            .await
        })
    }

    fn find_open_start(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        identifier: TimingIdentifier,
    ) -> BoxFuture<'_, Result<Option<TimingEvent>>> {
        Box::pin(async move {
            let statement = sql::find_open_start(DIALECT, &table, &scope, &identifier);
            self.run(move |conn| {
                let raw = conn
                    .query_row(
                        &statement.sql,
                        params_from_iter(statement.binds.iter()),
                        RawTimingRow::read,
                    )
                    .optional()
                    .map_err(|error| sqlite_error(&format!("query failed: {error}")))?;
                raw.map(|raw| raw.decode(scope)).transpose()
            })
            .await
        })
    }

    fn close_start(
        &self,
        table: TimingTable,
        id: i64,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let statement = sql::close_start(DIALECT, &table, id, ended_at);
            self.run(move |conn| execute(conn, &statement, "update").map(|_| ()))
                .await
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
            let statement = sql::aggregate_by_period(DIALECT, &table, &scope, range, granularity);
            self.run(move |conn| {
                query_all(conn, &statement, |row| {
                    Ok(PeriodAggregate {
                        key: row.get(0)?,
                        count: row.get(1)?,
                        total_ms: row.get(2)?,
                        average_ms: row.get(3)?,
                        min_ms: row.get(4)?,
                        max_ms: row.get(5)?,
                    })
                })
            })
            .await
        })
    }

    fn aggregate_totals(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<DurationTotals>> {
        Box::pin(async move {
            let statement = sql::aggregate_totals(DIALECT, &table, &scope, range);
            self.run(move |conn| {
                conn.query_row(
                    &statement.sql,
                    params_from_iter(statement.binds.iter()),
                    |row| {
                        Ok(DurationTotals {
                            count: row.get(0)?,
                            total_ms: row.get(1)?,
                            average_ms: row.get(2)?,
                            min_ms: row.get(3)?,
                            max_ms: row.get(4)?,
                        })
                    },
                )
                .map_err(|error| sqlite_error(&format!("query failed: {error}")))
            })
            .await
        })
    }

    fn list_timing_events(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
    ) -> BoxFuture<'_, Result<Vec<TimingEvent>>> {
        Box::pin(async move {
            let statement = sql::list_timing_events(DIALECT, &table, &scope);
            self.run(move |conn| {
                query_all(conn, &statement, RawTimingRow::read)?
                    .into_iter()
                    .map(|raw| raw.decode(scope.clone()))
                    .collect()
            })
            .await
        })
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Int(value) => ToSqlOutput::from(*value),
            Self::Text(value) => ToSqlOutput::from(value.as_str()),
            Self::Timestamp(at) => ToSqlOutput::from(Self::sqlite_timestamp(*at)),
            Self::Null => ToSqlOutput::from(Null),
        })
    }
}

struct RawCounterRow {
    id: i64,
    name: String,
    kind: String,
    value: i64,
    created_at: String,
}

impl RawCounterRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            value: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<CounterEvent> {
        Ok(CounterEvent {
            id: self.id,
            name: StatName::parse(&self.name)
                .map_err(|error| sqlite_error(&format!("decode failed: {error}")))?,
            kind: decode_counter_kind(BACKEND, &self.kind)?,
            value: self.value,
            recorded_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct RawTimingRow {
    id: i64,
    kind: String,
    identifier: Option<String>,
    started_at: String,
    ended_at: Option<String>,
    duration_ms: Option<i64>,
    context: Option<String>,
}

impl RawTimingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            identifier: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            duration_ms: row.get(5)?,
            context: row.get(6)?,
        })
    }

    fn decode(self, attributes: ScopeFilter) -> Result<TimingEvent> {
        Ok(TimingEvent {
            id: self.id,
            attributes,
            kind: decode_timing_kind(BACKEND, &self.kind)?,
            identifier: self
                .identifier
                .map(|raw| {
                    TimingIdentifier::parse(raw)
                        .map_err(|error| sqlite_error(&format!("decode failed: {error}")))
                })
                .transpose()?,
            started_at: parse_timestamp(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_timestamp).transpose()?,
            duration_ms: self.duration_ms,
            context: decode_context(BACKEND, self.context)?,
        })
    }
}

fn execute(conn: &Connection, statement: &Statement, action: &str) -> Result<usize> {
    tracing::trace!(sql = %statement.sql, binds = statement.binds.len(), "sqlite execute");
    conn.execute(&statement.sql, params_from_iter(statement.binds.iter()))
        .map_err(|error| sqlite_error(&format!("{action} failed: {error}")))
}

fn query_all<T, F>(conn: &Connection, statement: &Statement, map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    tracing::trace!(sql = %statement.sql, binds = statement.binds.len(), "sqlite query");
    let mut prepared = conn
        .prepare(&statement.sql)
        .map_err(|error| sqlite_error(&format!("prepare failed: {error}")))?;
    let rows = prepared
        .query_map(params_from_iter(statement.binds.iter()), map)
        .map_err(|error| sqlite_error(&format!("query failed: {error}")))?;
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(|error| sqlite_error(&format!("row decode failed: {error}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SQLITE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|error| sqlite_error(&format!("timestamp decode failed for `{raw}`: {error}")))
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|error| sqlite_error(&format!("mkdir failed: {error}")))?;
    }

    let conn =
        Connection::open(path).map_err(|error| sqlite_error(&format!("open failed: {error}")))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .map_err(|error| sqlite_error(&format!("pragma failed: {error}")))?;
    Ok(conn)
}

fn sqlite_error(message: &str) -> ErrorEnvelope {
    store_error(BACKEND, message)
}
