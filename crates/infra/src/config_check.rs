//! Config loading helpers.

use crate::InfraResult;
use entity_stats_config::{StatsEnv, load_stats_config_from_path, to_pretty_json};
use entity_stats_shared::ErrorEnvelope;
use std::collections::BTreeMap;
use std::path::Path;

/// Load and validate the effective config, returning deterministic pretty JSON.
///
/// The store connection is never part of the output.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
) -> InfraResult<String> {
    let env = StatsEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let config = load_stats_config_from_path(config_path, &env)?;
    to_pretty_json(config.as_ref())
}
