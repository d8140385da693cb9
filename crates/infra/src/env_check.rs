//! Environment validation helpers.

use entity_stats_config::{StatsConfig, StatsEnv, apply_env_overrides};
use entity_stats_shared::ErrorEnvelope;
use std::collections::BTreeMap;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided env overrides parse and merge into a valid config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = StatsEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(StatsConfig::default(), &parsed)?;
    Ok(())
}
