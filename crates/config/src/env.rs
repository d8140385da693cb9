//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict (invalid values fail fast) and secret values are
//! redacted in error metadata.

use crate::schema::{
    LogFormatSetting, LogLevelSetting, StatsConfig, StoreProvider, ValidatedStatsConfig,
};
use entity_stats_shared::{ErrorCode, ErrorEnvelope, REDACTED, SecretString, is_secret_key};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Env var: store provider (`sqlite` | `postgres` | `mysql`).
pub const ENV_STORE_PROVIDER: &str = "STATS_STORE_PROVIDER";
/// Env var: `SQLite` database path.
pub const ENV_STORE_PATH: &str = "STATS_STORE_PATH";
/// Env var: server connection URL (secret).
pub const ENV_STORE_CONNECTION: &str = "STATS_STORE_CONNECTION";
/// Env var: timing table name.
pub const ENV_TIME_STATS_TABLE: &str = "STATS_TIME_STATS_TABLE";
/// Env var: tenant column name.
pub const ENV_TENANT_COLUMN: &str = "STATS_TENANT_COLUMN";
/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "STATS_LOG_LEVEL";
/// Env var: log line format (`json` | `pretty`).
pub const ENV_LOG_FORMAT: &str = "STATS_LOG_FORMAT";

const ALL_VARS: [&str; 7] = [
    ENV_STORE_PROVIDER,
    ENV_STORE_PATH,
    ENV_STORE_CONNECTION,
    ENV_TIME_STATS_TABLE,
    ENV_TENANT_COLUMN,
    ENV_LOG_LEVEL,
    ENV_LOG_FORMAT,
];

/// Typed env-derived overrides for `StatsConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsEnv {
    /// Override for `store.provider`.
    pub store_provider: Option<StoreProvider>,
    /// Override for `store.path`.
    pub store_path: Option<PathBuf>,
    /// Override for `store.connection`.
    pub store_connection: Option<SecretString>,
    /// Override for `timeStats.table`.
    pub time_stats_table: Option<Box<str>>,
    /// Override for `tenant.column`.
    pub tenant_column: Option<Box<str>>,
    /// Override for `logging.level`.
    pub log_level: Option<LogLevelSetting>,
    /// Override for `logging.format`.
    pub log_format: Option<LogFormatSetting>,
}

impl StatsEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            store_provider: parse_optional_enum(map, ENV_STORE_PROVIDER, StoreProvider::parse)?,
            store_path: parse_optional_trimmed_string(map, ENV_STORE_PATH)?
                .map(|path| PathBuf::from(path.as_ref())),
            store_connection: parse_optional_secret(map, ENV_STORE_CONNECTION)?,
            time_stats_table: parse_optional_trimmed_string(map, ENV_TIME_STATS_TABLE)?,
            tenant_column: parse_optional_trimmed_string(map, ENV_TENANT_COLUMN)?,
            log_level: parse_optional_enum(map, ENV_LOG_LEVEL, LogLevelSetting::parse)?,
            log_format: parse_optional_enum(map, ENV_LOG_FORMAT, LogFormatSetting::parse)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map = ALL_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| ((*name).to_string(), value))
            })
            .collect();
        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: StatsConfig,
    env: &StatsEnv,
) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let mut config = base;
    if let Some(provider) = env.store_provider {
        config.store.provider = provider;
    }
    if let Some(path) = &env.store_path {
        config.store.path.clone_from(path);
    }
    if let Some(connection) = &env.store_connection {
        config.store.connection = Some(connection.clone());
    }
    if let Some(table) = &env.time_stats_table {
        config.time_stats.table.clone_from(table);
    }
    if let Some(column) = &env.tenant_column {
        config.tenant.column.clone_from(column);
    }
    if let Some(level) = env.log_level {
        config.logging.level = level;
    }
    if let Some(format) = env.log_format {
        config.logging.format = format;
    }

    config.validate_and_normalize().map_err(Into::into)
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } | Self::EmptySecret { var } => {
                write!(formatter, "{var} must be non-empty")
            },
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope.with_metadata("env_var", var)
            },
            EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_value(var, &value)),
        }
    }
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    Ok(Some(trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(trimmed.to_owned())))
}

fn parse_optional_enum<T>(
    map: &BTreeMap<String, String>,
    var: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, EnvParseError> {
    let Some(raw) = parse_optional_trimmed_string(map, var)? else {
        return Ok(None);
    };

    parse(&raw).map(Some).ok_or_else(|| EnvParseError::InvalidEnum {
        var,
        value: raw.into_string(),
    })
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn missing_vars_leave_everything_unset() -> Result<(), Box<dyn Error>> {
        assert_eq!(StatsEnv::from_map(&BTreeMap::new())?, StatsEnv::default());
        Ok(())
    }

    #[test]
    fn provider_aliases_are_accepted() -> Result<(), Box<dyn Error>> {
        let env = StatsEnv::from_map(&env_map(&[(ENV_STORE_PROVIDER, " PostgreSQL ")]))?;
        assert_eq!(env.store_provider, Some(StoreProvider::Postgres));

        let env = StatsEnv::from_map(&env_map(&[(ENV_LOG_LEVEL, "WARNING")]))?;
        assert_eq!(env.log_level, Some(LogLevelSetting::Warn));
        Ok(())
    }

    #[test]
    fn unsupported_enum_values_fail_fast() {
        let error = StatsEnv::from_map(&env_map(&[(ENV_STORE_PROVIDER, "mongodb")])).err();
        assert!(matches!(
            error,
            Some(EnvParseError::InvalidEnum { var: ENV_STORE_PROVIDER, .. })
        ));
    }

    #[test]
    fn secret_values_are_redacted_in_error_metadata() -> Result<(), Box<dyn Error>> {
        let error = StatsEnv::from_map(&env_map(&[(ENV_STORE_CONNECTION, "   ")])).err();
        let envelope: ErrorEnvelope = error
            .ok_or_else(|| std::io::Error::other("expected secret error"))?
            .into();

        assert_eq!(envelope.code, ErrorCode::new("config", "empty_env_var"));
        assert_eq!(
            envelope.metadata.get("env_var").map(String::as_str),
            Some(ENV_STORE_CONNECTION)
        );
        assert!(
            !envelope.metadata.contains_key("value"),
            "empty secrets should not echo value"
        );
        assert_eq!(redact_value(ENV_STORE_CONNECTION, "mysql://db"), REDACTED);
        assert_eq!(redact_value(ENV_LOG_LEVEL, "loud"), "loud");
        Ok(())
    }

    #[test]
    fn env_wins_over_file_values() -> Result<(), Box<dyn Error>> {
        let env = StatsEnv::from_map(&env_map(&[
            (ENV_TIME_STATS_TABLE, "job_timings"),
            (ENV_LOG_FORMAT, "pretty"),
        ]))?;

        let config = apply_env_overrides(StatsConfig::default(), &env)?;

        assert_eq!(config.time_stats_table().as_str(), "job_timings");
        assert_eq!(config.logging.format, LogFormatSetting::Pretty);
        Ok(())
    }
}
