//! JSON Schema export for the config file.

use crate::StatsConfig;
use schemars::{Schema, schema_for};

/// JSON Schema for `StatsConfig`.
#[must_use]
pub fn stats_config_schema() -> Schema {
    schema_for!(StatsConfig)
}
