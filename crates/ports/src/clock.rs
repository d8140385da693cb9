//! Time source boundary contract.

use chrono::{DateTime, Utc};
use entity_stats_domain::truncate_to_micros;

/// Supplies "now" to writers and queries.
pub trait ClockPort: Send + Sync {
    /// Current instant in UTC, at microsecond precision.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_micros(Utc::now())
    }
}
