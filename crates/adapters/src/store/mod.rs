//! Relational event stores.
//!
//! SQLite is always available. Postgres and MySQL sit behind the
//! `store-postgres` / `store-mysql` features and share the SQL text built in
//! [`sql`].

use entity_stats_domain::{CounterEventKind, TimingContext, TimingEventKind};
use entity_stats_shared::{ErrorEnvelope, Result};

#[cfg(feature = "store-mysql")]
mod mysql;
#[cfg(feature = "store-postgres")]
mod postgres;
pub mod sql;
mod sqlite;

#[cfg(feature = "store-mysql")]
pub use mysql::MySqlStatsStore;
#[cfg(feature = "store-postgres")]
pub use postgres::PostgresStatsStore;
pub use sqlite::SqliteStatsStore;

pub(crate) fn store_error(backend: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope::store(backend, format!("{backend} store {message}"))
}

pub(crate) fn decode_counter_kind(backend: &str, value: &str) -> Result<CounterEventKind> {
    CounterEventKind::parse(value).ok_or_else(|| {
        store_error(backend, &format!("decode failed: unknown counter type `{value}`"))
    })
}

pub(crate) fn decode_timing_kind(backend: &str, value: &str) -> Result<TimingEventKind> {
    TimingEventKind::parse(value).ok_or_else(|| {
        store_error(backend, &format!("decode failed: unknown timing type `{value}`"))
    })
}

pub(crate) fn encode_context(
    backend: &str,
    context: Option<&TimingContext>,
) -> Result<Option<String>> {
    context
        .map(|context| {
            serde_json::to_string(context)
                .map_err(|error| store_error(backend, &format!("context encode failed: {error}")))
        })
        .transpose()
}

pub(crate) fn decode_context(backend: &str, raw: Option<String>) -> Result<Option<TimingContext>> {
    raw.map(|raw| {
        serde_json::from_str::<TimingContext>(&raw)
            .map_err(|error| store_error(backend, &format!("context decode failed: {error}")))
    })
    .transpose()
}
