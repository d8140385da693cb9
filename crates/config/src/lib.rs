//! # entity-stats-config
//!
//! Configuration schema, env overrides, validation, and loading for the
//! stats store. This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;
/// JSON Schema export.
pub mod schema_export;

pub use schema::{
    CURRENT_CONFIG_VERSION, ConfigSchemaError, DEFAULT_STORE_PATH, DEFAULT_TENANT_COLUMN,
    DEFAULT_TIME_STATS_TABLE, LogFormatSetting, LogLevelSetting, LoggingConfig, StatsConfig,
    StoreConfig, StoreProvider, TenantConfig, TimeStatsConfig, ValidatedStatsConfig,
    parse_stats_config_json, parse_stats_config_toml,
};

pub use env::{
    ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_STORE_CONNECTION, ENV_STORE_PATH, ENV_STORE_PROVIDER,
    ENV_TENANT_COLUMN, ENV_TIME_STATS_TABLE, EnvParseError, StatsEnv, apply_env_overrides,
};
pub use load::{
    load_stats_config_from_path, load_stats_config_from_sources, load_stats_config_std_env,
    to_pretty_json, to_pretty_toml,
};
pub use schema_export::stats_config_schema;

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_stats_domain::domain_crate_version;
    use entity_stats_shared::shared_crate_version;

    #[test]
    fn config_crate_compiles() {
        let version = config_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn config_can_use_domain_and_shared() {
        let domain_version = domain_crate_version();
        let shared_version = shared_crate_version();

        assert!(!domain_version.is_empty());
        assert!(!shared_version.is_empty());
    }
}
