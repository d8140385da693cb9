//! # entity-stats-adapters
//!
//! Adapter implementations for ports: relational event stores (SQLite
//! always, Postgres/MySQL behind features) and the structured logger.
//! This crate depends on `ports`, `domain`, and `shared`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod log_sink;
pub mod logger;
pub mod store;

pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::{JsonLogger, LineFormat};
#[cfg(feature = "store-mysql")]
pub use store::MySqlStatsStore;
#[cfg(feature = "store-postgres")]
pub use store::PostgresStatsStore;
pub use store::SqliteStatsStore;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
