//! Dialect-aware SQL text for the relational stores.
//!
//! Identifiers are interpolated (they are validated `SqlIdentifier`s);
//! values are bound, except NULL which is rendered literally so Postgres
//! never has to infer a parameter type for it.

use chrono::{DateTime, NaiveDateTime, Utc};
use entity_stats_domain::{
    ColumnKind, EventCursor, Granularity, NewCounterEvent, NewTimingEvent, ScopeFilter,
    ScopeValue, StatFamily, StatName, TimingIdentifier, TimingTable, truncate_to_micros,
};
use entity_stats_ports::TimeRange;
use std::fmt::Write as _;

/// SQLite timestamp text layout (sorts lexically in time order).
pub const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Columns selected for counter rows, in decode order.
pub const COUNTER_COLUMNS: &str = "id, name, type, value, created_at";

/// Columns selected for timing rows, in decode order.
pub const TIMING_COLUMNS: &str =
    "id, type, identifier, started_at, ended_at, duration_ms, context";

/// SQL flavour of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite 3.46+ (`%G%V` in strftime).
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL 8.
    Mysql,
}

impl Dialect {
    /// Name used in error codes (`store:<name>`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite | Self::Mysql => "?".to_owned(),
        }
    }

    /// Expression rendering `column` as the bucket key of `granularity`.
    ///
    /// Output must equal `Granularity::key` for the same instant.
    #[must_use]
    pub fn bucket_expression(self, granularity: Granularity, column: &str) -> String {
        match self {
            Self::Sqlite => {
                let format = match granularity {
                    Granularity::Minute => "%Y-%m-%d %H:%M",
                    Granularity::Hour => "%Y-%m-%d %H",
                    Granularity::Day => "%Y-%m-%d",
                    Granularity::Week => "%G%V",
                    Granularity::Month => "%Y-%m",
                    Granularity::Year => "%Y",
                };
                format!("strftime('{format}', {column})")
            },
            Self::Postgres => {
                let format = match granularity {
                    Granularity::Minute => "YYYY-MM-DD HH24:MI",
                    Granularity::Hour => "YYYY-MM-DD HH24",
                    Granularity::Day => "YYYY-MM-DD",
                    Granularity::Week => "IYYYIW",
                    Granularity::Month => "YYYY-MM",
                    Granularity::Year => "YYYY",
                };
                format!("to_char({column}, '{format}')")
            },
            Self::Mysql => {
                let format = match granularity {
                    Granularity::Minute => "%Y-%m-%d %H:%i",
                    Granularity::Hour => "%Y-%m-%d %H",
                    Granularity::Day => "%Y-%m-%d",
                    Granularity::Week => return format!("CAST(YEARWEEK({column}, 3) AS CHAR)"),
                    Granularity::Month => "%Y-%m",
                    Granularity::Year => "%Y",
                };
                format!("date_format({column}, '{format}')")
            },
        }
    }

    const fn bigint(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres => "BIGINT",
            Self::Mysql => "SIGNED",
        }
    }

    const fn double(self) -> &'static str {
        match self {
            Self::Sqlite => "REAL",
            Self::Postgres => "DOUBLE PRECISION",
            Self::Mysql => "DOUBLE",
        }
    }

    const fn id_column(self) -> &'static str {
        match self {
            Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "id BIGSERIAL PRIMARY KEY",
            Self::Mysql => "id BIGINT AUTO_INCREMENT PRIMARY KEY",
        }
    }

    const fn timestamp_type(self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Postgres => "TIMESTAMP(6)",
            Self::Mysql => "DATETIME(6)",
        }
    }

    const fn short_text_type(self) -> &'static str {
        match self {
            Self::Sqlite | Self::Postgres => "TEXT",
            Self::Mysql => "VARCHAR(255)",
        }
    }

    const fn integer_type(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER",
            Self::Postgres | Self::Mysql => "BIGINT",
        }
    }
}

/// Bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Rendered as literal `NULL`, never bound.
    Null,
}

impl SqlValue {
    /// SQLite text form of a timestamp.
    #[must_use]
    pub fn sqlite_timestamp(at: DateTime<Utc>) -> String {
        at.format(SQLITE_TIMESTAMP_FORMAT).to_string()
    }

    /// Naive UTC form bound to `TIMESTAMP(6)`/`DATETIME(6)` columns.
    ///
    /// Cut to microseconds first; those columns round otherwise.
    #[must_use]
    pub fn naive(at: DateTime<Utc>) -> NaiveDateTime {
        truncate_to_micros(at).naive_utc()
    }
}

impl From<&ScopeValue> for SqlValue {
    fn from(value: &ScopeValue) -> Self {
        match value {
            ScopeValue::Integer(value) => Self::Int(*value),
            ScopeValue::Text(value) => Self::Text(value.to_string()),
        }
    }
}

impl From<Option<&ScopeValue>> for SqlValue {
    fn from(value: Option<&ScopeValue>) -> Self {
        value.map_or(Self::Null, Self::from)
    }
}

impl From<Option<DateTime<Utc>>> for SqlValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Null, timestamp)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// SQL text with its positional binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub binds: Vec<SqlValue>,
}

/// Incremental statement builder.
#[derive(Debug)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    binds: Vec<SqlValue>,
}

impl SqlBuilder {
    /// Start a statement.
    #[must_use]
    pub fn new(dialect: Dialect, head: &str) -> Self {
        Self {
            dialect,
            sql: head.to_owned(),
            binds: Vec::new(),
        }
    }

    /// Append raw SQL.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a value: a placeholder, or `NULL`.
    pub fn push_value(&mut self, value: SqlValue) -> &mut Self {
        if value == SqlValue::Null {
            self.sql.push_str("NULL");
        } else {
            self.binds.push(value);
            let placeholder = self.dialect.placeholder(self.binds.len());
            self.sql.push_str(&placeholder);
        }
        self
    }

    /// Append ` AND column = value` (or `IS NULL`) for every scope entry.
    pub fn push_scope(&mut self, scope: &ScopeFilter) -> &mut Self {
        for (column, value) in scope.iter() {
            match value {
                Some(value) => {
                    let _ = write!(self.sql, " AND {column} = ");
                    self.push_value(SqlValue::from(value));
                },
                None => {
                    let _ = write!(self.sql, " AND {column} IS NULL");
                },
            }
        }
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            binds: self.binds,
        }
    }
}

/// Map a timestamp into the dialect's bind form.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> SqlValue {
    SqlValue::Timestamp(truncate_to_micros(at))
}

// =============================================================================
// DDL
// =============================================================================

/// `CREATE TABLE` (and index) statements for a counter family.
#[must_use]
pub fn counter_table_ddl(dialect: Dialect, family: &StatFamily) -> Vec<String> {
    let table = family.table();
    let owner = family.owner_key();
    let tenant = family.tenant_key();
    let ts = dialect.timestamp_type();
    let int = dialect.integer_type();
    let text = dialect.short_text_type();

    let mut columns = vec![dialect.id_column().to_owned()];
    let mut index_columns = Vec::new();
    if family.is_tenant_aware() {
        columns.push(format!("{tenant} {int} NULL"));
        index_columns.push(tenant.as_str());
    }
    columns.push(format!("{owner} {int} NOT NULL"));
    columns.push(format!("name {text} NOT NULL"));
    columns.push(format!("type {text} NOT NULL"));
    columns.push(format!("value {int} NOT NULL"));
    columns.push(format!("created_at {ts} NOT NULL"));
    columns.push(format!("updated_at {ts} NOT NULL"));
    index_columns.extend([owner.as_str(), "name", "created_at"]);

    let index_name = format!("{table}_scope_index");
    let index_list = index_columns.join(", ");
    match dialect {
        Dialect::Mysql => {
            columns.push(format!("INDEX {index_name} ({index_list})"));
            vec![format!(
                "CREATE TABLE IF NOT EXISTS {table} ({})",
                columns.join(", ")
            )]
        },
        Dialect::Sqlite | Dialect::Postgres => vec![
            format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns.join(", ")),
            format!("CREATE INDEX IF NOT EXISTS {index_name} ON {table} ({index_list})"),
        ],
    }
}

/// `CREATE TABLE` (and index) statements for a timing table.
#[must_use]
pub fn timing_table_ddl(dialect: Dialect, table: &TimingTable) -> Vec<String> {
    let name = table.name();
    let ts = dialect.timestamp_type();
    let int = dialect.integer_type();
    let text = dialect.short_text_type();

    let mut columns = vec![dialect.id_column().to_owned()];
    for column in table.scope_columns() {
        let kind = match column.kind {
            ColumnKind::BigInt => int,
            ColumnKind::Text => text,
        };
        columns.push(format!("{} {kind} NULL", column.name));
    }
    columns.push(format!("type {text} NOT NULL"));
    columns.push(format!("identifier {text} NULL"));
    columns.push(format!("started_at {ts} NOT NULL"));
    columns.push(format!("ended_at {ts} NULL"));
    columns.push(format!("duration_ms {int} NULL"));
    columns.push("context TEXT NULL".to_owned());
    columns.push(format!("created_at {ts} NOT NULL"));
    columns.push(format!("updated_at {ts} NOT NULL"));

    let index_name = format!("{name}_type_started_index");
    match dialect {
        Dialect::Mysql => {
            columns.push(format!("INDEX {index_name} (type, started_at)"));
            vec![format!(
                "CREATE TABLE IF NOT EXISTS {name} ({})",
                columns.join(", ")
            )]
        },
        Dialect::Sqlite | Dialect::Postgres => vec![
            format!("CREATE TABLE IF NOT EXISTS {name} ({})", columns.join(", ")),
            format!("CREATE INDEX IF NOT EXISTS {index_name} ON {name} (type, started_at)"),
        ],
    }
}

// =============================================================================
// COUNTER STATEMENTS
// =============================================================================

/// Insert one counter row. Postgres gets `RETURNING id`.
#[must_use]
pub fn insert_counter(
    dialect: Dialect,
    family: &StatFamily,
    scope: &ScopeFilter,
    event: &NewCounterEvent,
) -> Statement {
    let mut columns: Vec<String> = scope.iter().map(|(column, _)| column.to_string()).collect();
    columns.extend(
        ["name", "type", "value", "created_at", "updated_at"]
            .iter()
            .map(|column| (*column).to_owned()),
    );

    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "INSERT INTO {} ({}) VALUES (",
            family.table(),
            columns.join(", ")
        ),
    );
    let mut values: Vec<SqlValue> = scope.iter().map(|(_, value)| SqlValue::from(value)).collect();
    values.extend([
        SqlValue::Text(event.name.to_string()),
        SqlValue::Text(event.kind.as_str().to_owned()),
        SqlValue::Int(event.value),
        timestamp(event.recorded_at),
        timestamp(event.recorded_at),
    ]);
    push_value_list(&mut builder, values);
    builder.push(")");
    if dialect == Dialect::Postgres {
        builder.push(" RETURNING id");
    }
    builder.build()
}

/// Latest `set` at or before `as_of`.
#[must_use]
pub fn latest_set(
    dialect: Dialect,
    family: &StatFamily,
    scope: &ScopeFilter,
    name: &StatName,
    as_of: DateTime<Utc>,
) -> Statement {
    let mut builder = counter_select(dialect, family, scope, name, "set");
    builder.push(" AND created_at <= ");
    builder.push_value(timestamp(as_of));
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT 1");
    builder.build()
}

/// Sum of `change` values after `after` (exclusive) up to `until` (inclusive).
#[must_use]
pub fn sum_changes(
    dialect: Dialect,
    family: &StatFamily,
    scope: &ScopeFilter,
    name: &StatName,
    after: Option<EventCursor>,
    until: DateTime<Utc>,
) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "SELECT CAST(COALESCE(SUM(value), 0) AS {}) FROM {} WHERE 1 = 1",
            dialect.bigint(),
            family.table()
        ),
    );
    builder.push_scope(scope);
    builder.push(" AND name = ");
    builder.push_value(SqlValue::Text(name.to_string()));
    builder.push(" AND type = 'change' AND created_at <= ");
    builder.push_value(timestamp(until));
    if let Some(cursor) = after {
        builder.push(" AND (created_at > ");
        builder.push_value(timestamp(cursor.recorded_at));
        builder.push(" OR (created_at = ");
        builder.push_value(timestamp(cursor.recorded_at));
        builder.push(" AND id > ");
        builder.push_value(SqlValue::Int(cursor.id));
        builder.push("))");
    }
    builder.build()
}

/// Every event recorded strictly before `before`, oldest first.
#[must_use]
pub fn list_counter_events(
    dialect: Dialect,
    family: &StatFamily,
    scope: &ScopeFilter,
    name: &StatName,
    before: DateTime<Utc>,
) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!("SELECT {COUNTER_COLUMNS} FROM {} WHERE 1 = 1", family.table()),
    );
    builder.push_scope(scope);
    builder.push(" AND name = ");
    builder.push_value(SqlValue::Text(name.to_string()));
    builder.push(" AND created_at < ");
    builder.push_value(timestamp(before));
    builder.push(" ORDER BY created_at ASC, id ASC");
    builder.build()
}

fn counter_select(
    dialect: Dialect,
    family: &StatFamily,
    scope: &ScopeFilter,
    name: &StatName,
    kind: &str,
) -> SqlBuilder {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!("SELECT {COUNTER_COLUMNS} FROM {} WHERE 1 = 1", family.table()),
    );
    builder.push_scope(scope);
    builder.push(" AND name = ");
    builder.push_value(SqlValue::Text(name.to_string()));
    builder.push(&format!(" AND type = '{kind}'"));
    builder
}

// =============================================================================
// TIMING STATEMENTS
// =============================================================================

/// Insert one timing row. `context_json` is the encoded context, if any.
///
/// `created_at` and `updated_at` take the event's own end (or start) time.
#[must_use]
pub fn insert_timing(
    dialect: Dialect,
    table: &TimingTable,
    event: &NewTimingEvent,
    context_json: Option<String>,
) -> Statement {
    let written_at = event.ended_at.unwrap_or(event.started_at);
    let mut columns: Vec<String> = event
        .attributes
        .iter()
        .map(|(column, _)| column.to_string())
        .collect();
    columns.extend(
        [
            "type",
            "identifier",
            "started_at",
            "ended_at",
            "duration_ms",
            "context",
            "created_at",
            "updated_at",
        ]
        .iter()
        .map(|column| (*column).to_owned()),
    );

    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "INSERT INTO {} ({}) VALUES (",
            table.name(),
            columns.join(", ")
        ),
    );
    let mut values: Vec<SqlValue> = event
        .attributes
        .iter()
        .map(|(_, value)| SqlValue::from(value))
        .collect();
    values.extend([
        SqlValue::Text(event.kind.as_str().to_owned()),
        SqlValue::from(event.identifier.as_ref().map(ToString::to_string)),
        timestamp(event.started_at),
        SqlValue::from(event.ended_at),
        SqlValue::from(event.duration_ms),
        SqlValue::from(context_json),
        timestamp(written_at),
        timestamp(written_at),
    ]);
    push_value_list(&mut builder, values);
    builder.push(")");
    if dialect == Dialect::Postgres {
        builder.push(" RETURNING id");
    }
    builder.build()
}

/// Newest open start for `identifier`.
#[must_use]
pub fn find_open_start(
    dialect: Dialect,
    table: &TimingTable,
    scope: &ScopeFilter,
    identifier: &TimingIdentifier,
) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "SELECT {TIMING_COLUMNS} FROM {} WHERE type = 'start' AND ended_at IS NULL",
            table.name()
        ),
    );
    builder.push(" AND identifier = ");
    builder.push_value(SqlValue::Text(identifier.to_string()));
    builder.push_scope(scope);
    builder.push(" ORDER BY started_at DESC, id DESC LIMIT 1");
    builder.build()
}

/// Mark a start row as consumed.
#[must_use]
pub fn close_start(
    dialect: Dialect,
    table: &TimingTable,
    id: i64,
    ended_at: DateTime<Utc>,
) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!("UPDATE {} SET ended_at = ", table.name()),
    );
    builder.push_value(timestamp(ended_at));
    builder.push(", updated_at = ");
    builder.push_value(timestamp(ended_at));
    builder.push(" WHERE id = ");
    builder.push_value(SqlValue::Int(id));
    builder.build()
}

/// Grouped aggregates: `period_key, count, total, average, min, max`.
#[must_use]
pub fn aggregate_by_period(
    dialect: Dialect,
    table: &TimingTable,
    scope: &ScopeFilter,
    range: TimeRange,
    granularity: Granularity,
) -> Statement {
    let bucket = dialect.bucket_expression(granularity, "started_at");
    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "SELECT {bucket} AS period_key, {} FROM {}",
            aggregate_columns(dialect),
            table.name()
        ),
    );
    push_completed_window(&mut builder, scope, range);
    builder.push(" GROUP BY period_key");
    builder.build()
}

/// Ungrouped aggregates: `count, total, average, min, max`.
#[must_use]
pub fn aggregate_totals(
    dialect: Dialect,
    table: &TimingTable,
    scope: &ScopeFilter,
    range: TimeRange,
) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!(
            "SELECT {} FROM {}",
            aggregate_columns(dialect),
            table.name()
        ),
    );
    push_completed_window(&mut builder, scope, range);
    builder.build()
}

/// Rows matching `scope`, in id order.
#[must_use]
pub fn list_timing_events(dialect: Dialect, table: &TimingTable, scope: &ScopeFilter) -> Statement {
    let mut builder = SqlBuilder::new(
        dialect,
        &format!("SELECT {TIMING_COLUMNS} FROM {} WHERE 1 = 1", table.name()),
    );
    builder.push_scope(scope);
    builder.push(" ORDER BY id ASC");
    builder.build()
}

fn aggregate_columns(dialect: Dialect) -> String {
    let bigint = dialect.bigint();
    let double = dialect.double();
    format!(
        "COUNT(*) AS row_count, \
         CAST(COALESCE(SUM(duration_ms), 0) AS {bigint}) AS total_ms, \
         CAST(COALESCE(AVG(duration_ms), 0) AS {double}) AS average_ms, \
         CAST(COALESCE(MIN(duration_ms), 0) AS {bigint}) AS min_ms, \
         CAST(COALESCE(MAX(duration_ms), 0) AS {bigint}) AS max_ms"
    )
}

fn push_completed_window(builder: &mut SqlBuilder, scope: &ScopeFilter, range: TimeRange) {
    builder.push(" WHERE type = 'completed' AND duration_ms IS NOT NULL AND started_at >= ");
    builder.push_value(timestamp(range.start));
    builder.push(" AND started_at < ");
    builder.push_value(timestamp(range.end));
    builder.push_scope(scope);
}

fn push_value_list(builder: &mut SqlBuilder, values: Vec<SqlValue>) {
    for (index, value) in values.into_iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push_value(value);
    }
}
