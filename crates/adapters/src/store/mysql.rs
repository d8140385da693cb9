use super::sql::{self, Dialect, SqlValue, Statement};
use super::{decode_context, decode_counter_kind, decode_timing_kind, encode_context, store_error};
use chrono::{DateTime, NaiveDateTime, Utc};
use entity_stats_domain::{
    CounterEvent, DurationTotals, EventCursor, Granularity, NewCounterEvent, NewTimingEvent,
    PeriodAggregate, ScopeFilter, StatFamily, StatName, TimingEvent, TimingIdentifier,
    TimingTable,
};
use entity_stats_ports::{BoxFuture, CounterEventStore, TimeRange, TimingEventStore};
use entity_stats_shared::{ErrorEnvelope, Result};
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, Pool, Row};

const BACKEND: &str = "mysql";
const DIALECT: Dialect = Dialect::Mysql;

/// MySQL-backed store over a lazily connected pool.
///
/// Ids come from `LAST_INSERT_ID()`; MySQL has no `RETURNING`.
#[derive(Debug, Clone)]
pub struct MySqlStatsStore {
    pool: Pool<MySql>,
}

impl MySqlStatsStore {
    /// Create a store; the pool connects on first use.
    pub fn new(connection: &str) -> Result<Self> {
        let pool = Pool::<MySql>::connect_lazy(connection)
            .map_err(|error| mysql_error(&format!("connect failed: {error}")))?;
        Ok(Self { pool })
    }

    async fn insert(&self, statement: &Statement) -> Result<i64> {
        let done = bind_all(statement)
            .execute(&self.pool)
            .await
            .map_err(|error| mysql_error(&format!("insert failed: {error}")))?;
        i64::try_from(done.last_insert_id())
            .map_err(|_| mysql_error("insert failed: id overflow"))
    }

    async fn execute(&self, statement: &Statement, action: &str) -> Result<u64> {
        bind_all(statement)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(|error| mysql_error(&format!("{action} failed: {error}")))
    }

    async fn fetch_optional(&self, statement: &Statement) -> Result<Option<MySqlRow>> {
        bind_all(statement)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| mysql_error(&format!("query failed: {error}")))
    }

    async fn fetch_one(&self, statement: &Statement) -> Result<MySqlRow> {
        bind_all(statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| mysql_error(&format!("query failed: {error}")))
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<MySqlRow>> {
        bind_all(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| mysql_error(&format!("query failed: {error}")))
    }

    async fn run_ddl(&self, ddl: Vec<String>) -> Result<()> {
        for statement in ddl {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|error| mysql_error(&format!("schema failed: {error}")))?;
        }
        Ok(())
    }
}

impl CounterEventStore for MySqlStatsStore {
    fn ensure_counter_table(&self, family: StatFamily) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.run_ddl(sql::counter_table_ddl(DIALECT, &family)).await })
    }

    fn insert_counter_event(
        &self,
        family: StatFamily,
        scope: ScopeFilter,
        event: NewCounterEvent,
    ) -> BoxFuture<'_, Result<CounterEvent>> {
        Box::pin(async move {
            let statement = sql::insert_counter(DIALECT, &family, &scope, &event);
            let id = self.insert(&statement).await?;
            Ok(CounterEvent::from_new(id, event))
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
            self.fetch_optional(&statement)
                .await?
                .as_ref()
                .map(decode_counter)
                .transpose()
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
            get(&self.fetch_one(&statement).await?, 0)
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
            self.fetch_all(&statement)
                .await?
                .iter()
                .map(decode_counter)
                .collect()
        })
    }
}

impl TimingEventStore for MySqlStatsStore {
    fn ensure_timing_table(&self, table: TimingTable) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.run_ddl(sql::timing_table_ddl(DIALECT, &table)).await })
    }

    fn insert_timing_event(
        &self,
        table: TimingTable,
        event: NewTimingEvent,
    ) -> BoxFuture<'_, Result<TimingEvent>> {
        Box::pin(async move {
            let context = encode_context(BACKEND, event.context.as_ref())?;
            let statement = sql::insert_timing(DIALECT, &table, &event, context);
            let id = self.insert(&statement).await?;
            Ok(TimingEvent::from_new(id, event))
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
            self.fetch_optional(&statement)
                .await?
                .as_ref()
                .map(|row| decode_timing(row, scope))
                .transpose()
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
            self.execute(&statement, "update").await.map(|_| ())
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
            self.fetch_all(&statement)
                .await?
                .iter()
                .map(|row| {
                    Ok(PeriodAggregate {
                        key: get(row, 0)?,
                        count: get(row, 1)?,
                        total_ms: get(row, 2)?,
                        average_ms: get(row, 3)?,
                        min_ms: get(row, 4)?,
                        max_ms: get(row, 5)?,
                    })
                })
                .collect()
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
            let row = self.fetch_one(&statement).await?;
            Ok(DurationTotals {
                count: get(&row, 0)?,
                total_ms: get(&row, 1)?,
                average_ms: get(&row, 2)?,
                min_ms: get(&row, 3)?,
                max_ms: get(&row, 4)?,
            })
        })
    }

    fn list_timing_events(
        &self,
        table: TimingTable,
        scope: ScopeFilter,
    ) -> BoxFuture<'_, Result<Vec<TimingEvent>>> {
        Box::pin(async move {
            let statement = sql::list_timing_events(DIALECT, &table, &scope);
            self.fetch_all(&statement)
                .await?
                .iter()
                .map(|row| decode_timing(row, scope.clone()))
                .collect()
        })
    }
}

fn bind_all(statement: &Statement) -> Query<'_, MySql, MySqlArguments> {
    tracing::trace!(sql = %statement.sql, binds = statement.binds.len(), "mysql statement");
    statement
        .binds
        .iter()
        .fold(sqlx::query(&statement.sql), |query, value| match value {
            SqlValue::Int(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Timestamp(at) => query.bind(SqlValue::naive(*at)),
            SqlValue::Null => query,
        })
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Result<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get(index)
        .map_err(|error| mysql_error(&format!("decode failed: {error}")))
}

fn decode_counter(row: &MySqlRow) -> Result<CounterEvent> {
    let name: String = get(row, 1)?;
    let kind: String = get(row, 2)?;
    let created_at: NaiveDateTime = get(row, 4)?;
    Ok(CounterEvent {
        id: get(row, 0)?,
        name: StatName::parse(&name)
            .map_err(|error| mysql_error(&format!("decode failed: {error}")))?,
        kind: decode_counter_kind(BACKEND, &kind)?,
        value: get(row, 3)?,
        recorded_at: created_at.and_utc(),
    })
}

fn decode_timing(row: &MySqlRow, attributes: ScopeFilter) -> Result<TimingEvent> {
    let kind: String = get(row, 1)?;
    let identifier: Option<String> = get(row, 2)?;
    let started_at: NaiveDateTime = get(row, 3)?;
    let ended_at: Option<NaiveDateTime> = get(row, 4)?;
    Ok(TimingEvent {
        id: get(row, 0)?,
        attributes,
        kind: decode_timing_kind(BACKEND, &kind)?,
        identifier: identifier
            .map(|raw| {
                TimingIdentifier::parse(raw)
                    .map_err(|error| mysql_error(&format!("decode failed: {error}")))
            })
            .transpose()?,
        started_at: started_at.and_utc(),
        ended_at: ended_at.map(|naive| naive.and_utc()),
        duration_ms: get(row, 5)?,
        context: decode_context(BACKEND, get(row, 6)?)?,
    })
}

fn mysql_error(message: &str) -> ErrorEnvelope {
    store_error(BACKEND, message)
}
