//! # entity-stats-app
//!
//! Application services for counter and timing stats.
//! This crate depends on `ports`, `domain`, and `shared`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod counter_query;
pub mod deps;
pub mod error;
pub mod named_timing;
pub mod stat_builder;
pub mod timing_query;
pub mod timing_writer;
pub mod window;

pub use counter_query::CounterQuery;
pub use deps::StatsDeps;
pub use error::StatsError;
pub use named_timing::{NAME_COLUMN, NamedTimingStat, named_timing_table};
pub use stat_builder::StatBuilder;
pub use timing_query::TimingQuery;
pub use timing_writer::TimingWriter;
pub use window::{DEFAULT_LOOKBACK, QueryWindow};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
