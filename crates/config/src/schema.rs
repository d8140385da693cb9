//! Stats configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Secrets never leave the process through `Serialize` or error metadata.

use entity_stats_domain::SqlIdentifier;
use entity_stats_shared::{ErrorCode, ErrorEnvelope, SecretString};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use url::Url;

/// Strip credentials from a connection URL before it reaches an error message.
fn sanitize_url_for_error(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() || !parsed.username().is_empty() {
                if parsed.set_username("").is_err() {
                    return "[invalid url: invalid username]".to_string();
                }
                if parsed.set_password(None).is_err() {
                    return "[invalid url: invalid password]".to_string();
                }
            }
            parsed.to_string()
        },
        Err(error) => format!("[invalid url: {error}]"),
    }
}

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Default `SQLite` database file.
pub const DEFAULT_STORE_PATH: &str = ".stats/stats.db";
/// Default timing table.
pub const DEFAULT_TIME_STATS_TABLE: &str = "time_stats_events";
/// Default tenant column for tenant-aware families.
pub const DEFAULT_TENANT_COLUMN: &str = "tenant_id";

/// Top-level stats configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StatsConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Event store selection.
    pub store: StoreConfig,
    /// Timing table settings.
    pub time_stats: TimeStatsConfig,
    /// Tenant column settings.
    pub tenant: TenantConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            store: StoreConfig::default(),
            time_stats: TimeStatsConfig::default(),
            tenant: TenantConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StatsConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedStatsConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }

        self.store.normalize();
        self.store.validate()?;
        self.time_stats.table = self.time_stats.table.trim().into();
        self.tenant.column = self.tenant.column.trim().into();

        let time_stats_table = identifier("timeStats", "table", &self.time_stats.table)?;
        let tenant_column = identifier("tenant", "column", &self.tenant.column)?;

        Ok(ValidatedStatsConfig {
            raw: self,
            time_stats_table,
            tenant_column,
        })
    }
}

fn identifier(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<SqlIdentifier, ConfigSchemaError> {
    SqlIdentifier::parse(value).map_err(|_| ConfigSchemaError::InvalidIdentifier {
        section,
        field,
        value: value.to_string(),
    })
}

/// A config that passed validation, with its identifiers pre-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatsConfig {
    raw: StatsConfig,
    time_stats_table: SqlIdentifier,
    tenant_column: SqlIdentifier,
}

impl ValidatedStatsConfig {
    /// Timing table name.
    #[must_use]
    pub const fn time_stats_table(&self) -> &SqlIdentifier {
        &self.time_stats_table
    }

    /// Tenant column for tenant-aware families.
    #[must_use]
    pub const fn tenant_column(&self) -> &SqlIdentifier {
        &self.tenant_column
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &StatsConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> StatsConfig {
        self.raw
    }
}

impl AsRef<StatsConfig> for ValidatedStatsConfig {
    fn as_ref(&self) -> &StatsConfig {
        &self.raw
    }
}

impl Deref for ValidatedStatsConfig {
    type Target = StatsConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Parse a stats config from a JSON string, applying validation and normalization.
pub fn parse_stats_config_json(input: &str) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let config: StatsConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse a stats config from a TOML string, applying validation and normalization.
pub fn parse_stats_config_toml(input: &str) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let config: StatsConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Event store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// Local `SQLite` file.
    #[default]
    Sqlite,
    /// Postgres server.
    Postgres,
    /// MySQL or MariaDB server.
    Mysql,
}

impl StoreProvider {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Parse a provider name, accepting common aliases.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" | "pgsql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            _ => None,
        }
    }

    const fn url_schemes(self) -> &'static [&'static str] {
        match self {
            Self::Sqlite => &[],
            Self::Postgres => &["postgres", "postgresql"],
            Self::Mysql => &["mysql", "mariadb"],
        }
    }
}

impl fmt::Display for StoreProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Event store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StoreConfig {
    /// Backend selection.
    pub provider: StoreProvider,
    /// Database file for the `sqlite` provider.
    pub path: PathBuf,
    /// Connection URL for server providers (kept in memory; not serialized).
    #[serde(skip_serializing)]
    #[schemars(with = "Option<String>")]
    pub connection: Option<SecretString>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Sqlite,
            path: PathBuf::from(DEFAULT_STORE_PATH),
            connection: None,
        }
    }
}

impl StoreConfig {
    fn normalize(&mut self) {
        self.connection = self
            .connection
            .take()
            .map(|value| value.expose().trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(SecretString::from);
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        match self.provider {
            StoreProvider::Sqlite => {
                if self.path.as_os_str().is_empty() {
                    return Err(ConfigSchemaError::EmptyStorePath);
                }
                Ok(())
            },
            provider => {
                let connection = self
                    .connection
                    .as_ref()
                    .ok_or(ConfigSchemaError::MissingConnection { provider })?;
                let parsed = Url::parse(connection.expose()).map_err(|_| {
                    ConfigSchemaError::InvalidConnection {
                        provider,
                        url: connection.expose().to_string(),
                    }
                })?;
                if !provider.url_schemes().contains(&parsed.scheme()) {
                    return Err(ConfigSchemaError::InvalidConnection {
                        provider,
                        url: connection.expose().to_string(),
                    });
                }
                Ok(())
            },
        }
    }
}

/// Timing table configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TimeStatsConfig {
    /// Table holding timing events.
    pub table: Box<str>,
}

impl Default for TimeStatsConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TIME_STATS_TABLE.into(),
        }
    }
}

/// Tenant column configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TenantConfig {
    /// Column naming the tenant on tenant-aware families.
    pub column: Box<str>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            column: DEFAULT_TENANT_COLUMN.into(),
        }
    }
}

/// Minimum log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelSetting {
    /// Everything.
    Debug,
    /// Writes and lifecycle events.
    #[default]
    Info,
    /// Unmatched timing ends and degraded paths.
    Warn,
    /// Failed store calls only.
    Error,
}

impl LogLevelSetting {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive; `warning` is accepted).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable text.
    Pretty,
}

impl LogFormatSetting {
    /// Parse a format name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Minimum level.
    pub level: LogLevelSetting,
    /// Line format.
    pub format: LogFormatSetting,
}

/// Typed validation errors for the configuration schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A table or column name is not a safe SQL identifier.
    InvalidIdentifier {
        /// Schema section (e.g. `timeStats`).
        section: &'static str,
        /// Field name in the config file (e.g. `table`).
        field: &'static str,
        /// Rejected value.
        value: String,
    },
    /// The `sqlite` provider needs a database path.
    EmptyStorePath,
    /// A server provider was selected without a connection URL.
    MissingConnection {
        /// Selected provider.
        provider: StoreProvider,
    },
    /// The connection URL does not parse or has the wrong scheme.
    InvalidConnection {
        /// Selected provider.
        provider: StoreProvider,
        /// Raw URL (sanitized before it is reported).
        url: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::InvalidIdentifier { .. } => ErrorCode::new("config", "invalid_identifier"),
            Self::EmptyStorePath => ErrorCode::new("config", "empty_store_path"),
            Self::MissingConnection { .. } => ErrorCode::new("config", "missing_connection"),
            Self::InvalidConnection { .. } => ErrorCode::new("config", "invalid_connection"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => {
                write!(
                    formatter,
                    "unsupported config version: {found} (supported: {supported})"
                )
            },
            Self::InvalidIdentifier { section, field, .. } => write!(
                formatter,
                "{section}.{field} must be a plain SQL identifier"
            ),
            Self::EmptyStorePath => formatter.write_str("store.path must be non-empty for sqlite"),
            Self::MissingConnection { provider } => {
                write!(formatter, "store.connection is required for {provider}")
            },
            Self::InvalidConnection { provider, .. } => {
                write!(formatter, "store.connection is not a valid {provider} URL")
            },
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::InvalidIdentifier {
                section,
                field,
                value,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value),
            ConfigSchemaError::EmptyStorePath => envelope.with_metadata("section", "store"),
            ConfigSchemaError::MissingConnection { provider } => {
                envelope.with_metadata("provider", provider.as_str())
            },
            ConfigSchemaError::InvalidConnection { provider, url } => envelope
                .with_metadata("provider", provider.as_str())
                .with_metadata("url", sanitize_url_for_error(&url)),
        }
    }
}
