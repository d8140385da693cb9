//! # entity-stats-facade
//!
//! Public entry point for embedders.
//! This crate depends on `infra`, `app`, and `config`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod stats;

pub use stats::Stats;

pub use entity_stats_app::{
    CounterQuery, NamedTimingStat, StatBuilder, StatsDeps, TimingQuery, TimingWriter,
};
pub use entity_stats_config::{StatsConfig, StatsEnv, ValidatedStatsConfig};
pub use entity_stats_domain::{
    CounterDataPoint, Granularity, ScopeFilter, ScopeValue, StatFamily, StatOwner, TenantRef,
    TimeDataPoint, TimingContext,
};
pub use entity_stats_shared::{ErrorCode, ErrorEnvelope, Result};

/// Infra error type (shared error envelope).
pub use entity_stats_infra::InfraError;
/// Re-export redaction utilities for boundary sanitization.
pub use entity_stats_infra::{is_secret_key, redact_if_secret};

/// Returns the facade crate version.
#[must_use]
pub const fn facade_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Validate that the provided env overrides can be parsed and merged into a config.
pub fn validate_env_parsing(env: &std::collections::BTreeMap<String, String>) -> Result<()> {
    entity_stats_infra::validate_env_parsing(env)
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &std::collections::BTreeMap<String, String>,
    config_path: Option<&std::path::Path>,
) -> Result<String> {
    entity_stats_infra::load_effective_config_json(env, config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_stats_app::app_crate_version;
    use entity_stats_infra::infra_crate_version;

    #[test]
    fn facade_crate_compiles() {
        let version = facade_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn facade_can_use_infra_app() {
        assert!(!infra_crate_version().is_empty());
        assert!(!app_crate_version().is_empty());
    }
}
