//! # entity-stats-testkit
//!
//! Test helpers and in-memory adapters.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod clock;
pub mod errors;
pub mod in_memory;
pub mod temp_db;

pub use clock::{FixedClock, utc};
pub use in_memory::{InMemoryStatsStore, NoopLogger, RecordingLogger};
pub use temp_db::TempDatabase;

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_stats_ports::ports_crate_version;
    use entity_stats_shared::shared_crate_version;

    #[test]
    fn testkit_crate_compiles() {
        let version = testkit_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn testkit_can_use_ports_and_shared() {
        let ports_version = ports_crate_version();
        let shared_version = shared_crate_version();

        assert!(!ports_version.is_empty());
        assert!(!shared_version.is_empty());
    }

    #[test]
    fn error_fixtures_are_available() {
        let codes = errors::common_error_codes();
        assert!(codes.contains(&errors::capability_error().code));
        assert!(codes.contains(&errors::validation_error().code));
        assert!(codes.contains(&errors::store_error().code));
    }

    #[test]
    fn in_memory_adapters_are_available() {
        let _ = in_memory::NoopLogger::default();
    }
}
