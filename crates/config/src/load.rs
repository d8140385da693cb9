//! Config loading helpers (file + env).
//!
//! Precedence (highest wins): env overrides, config file, defaults.

use crate::{StatsConfig, StatsEnv, ValidatedStatsConfig, apply_env_overrides};
use entity_stats_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the stats config from optional JSON text plus env overrides.
pub fn load_stats_config_from_sources(
    config_json: Option<&str>,
    env: &StatsEnv,
) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let config = match config_json {
        None => StatsConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };

    apply_env_overrides(config, env)
}

/// Load the stats config from an optional file path (`.json` or `.toml`).
pub fn load_stats_config_from_path(
    config_path: Option<&Path>,
    env: &StatsEnv,
) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let config = match config_path {
        None => StatsConfig::default(),
        Some(path) => {
            let format = detect_config_format(path)?;
            let config_text = read_config_file(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };

    apply_env_overrides(config, env)
}

/// Load the stats config from std env and an optional file path.
pub fn load_stats_config_std_env(
    config_path: Option<&Path>,
) -> Result<ValidatedStatsConfig, ErrorEnvelope> {
    let env = StatsEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_stats_config_from_path(config_path, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &StatsConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &StatsConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<StatsConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevelSetting;
    use std::path::PathBuf;

    #[test]
    fn env_overrides_file_values() -> Result<(), Box<dyn std::error::Error>> {
        let config_json = r#"{ "logging": { "level": "debug" }, "timeStats": { "table": "a" } }"#;
        let env = StatsEnv {
            log_level: Some(LogLevelSetting::Error),
            ..StatsEnv::default()
        };

        let config = load_stats_config_from_sources(Some(config_json), &env)?;
        assert_eq!(config.logging.level, LogLevelSetting::Error);
        assert_eq!(config.time_stats_table().as_str(), "a");
        Ok(())
    }

    #[test]
    fn serialization_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_stats_config_from_sources(None, &StatsEnv::default())?;
        let first = to_pretty_json(&config)?;
        let second = to_pretty_json(&config)?;
        assert_eq!(first, second);
        assert!(to_pretty_toml(&config)?.contains("[timeStats]"));
        Ok(())
    }

    #[test]
    fn unknown_extensions_are_rejected_before_reading() {
        let error = load_stats_config_from_path(
            Some(&PathBuf::from("stats.yaml")),
            &StatsEnv::default(),
        )
        .err();

        assert_eq!(
            error.map(|envelope| envelope.code),
            Some(ErrorCode::new("config", "unsupported_format"))
        );
    }

    #[test]
    fn missing_files_report_not_found() {
        let error = load_stats_config_from_path(
            Some(&PathBuf::from("/nonexistent/entity-stats/config.toml")),
            &StatsEnv::default(),
        )
        .err();

        assert_eq!(
            error.map(|envelope| envelope.code),
            Some(ErrorCode::new("config", "config_file_not_found"))
        );
    }
}
