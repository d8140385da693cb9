//! # entity-stats-domain
//!
//! Event model and algorithms for entity stats, with no I/O:
//!
//! - **Primitives** - `StatName`, `TimingIdentifier`, `SqlIdentifier`, `ScopeValue`
//! - **Families** - `StatFamily` (counter tables), `TimingTable`
//! - **Scopes** - `ScopeFilter`, `CounterScope`, tenant handling
//! - **Counters** - events, point-in-time reconstruction, per-period series
//! - **Timings** - start/completed rows and context merging
//! - **Periods** - granularity truncation and bucket keys
//! - **Data points** - zero-filled per-bucket summaries
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use entity_stats_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod counter;
pub mod data_point;
pub mod family;
pub mod period;
pub mod primitives;
pub mod scope;
pub mod timing;

pub use counter::{
    CounterDataPoint, CounterEvent, CounterEventKind, EventCursor, NewCounterEvent, combine,
    counter_series, reconstruct_value,
};
pub use data_point::{
    DurationTotals, PeriodAggregate, TimeDataPoint, merge_time_series, round2, truncate_ms,
};
pub use family::{
    ColumnKind, DEFAULT_TENANT_COLUMN, DEFAULT_TIMING_TABLE, ScopeColumn, StatFamily, TimingTable,
};
pub use period::{
    Granularity, ParseGranularityError, Period, Periods, generate_periods, periods,
    truncate_to_micros,
};
pub use primitives::{
    MAX_SQL_IDENTIFIER_LEN, PrimitiveError, ScopeValue, SqlIdentifier, StatName, TimingIdentifier,
};
pub use scope::{CounterScope, ScopeFilter, StatOwner, TenantRef, TenantScope};
pub use timing::{
    NewTimingEvent, TimingContext, TimingEvent, TimingEventKind, elapsed_ms, merge_context,
};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================
