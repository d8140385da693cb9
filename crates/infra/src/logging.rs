//! Logger and tracing subscriber setup from the logging config.

use crate::InfraResult;
use entity_stats_adapters::{JsonLogger, LineFormat, LogSink, StderrLogSink};
use entity_stats_config::{LogFormatSetting, LogLevelSetting, LoggingConfig};
use entity_stats_ports::{LogFields, LogLevel, LoggerPort};
use entity_stats_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Build a stderr logger honoring the configured level and format.
#[must_use]
pub fn build_logger(config: &LoggingConfig) -> Arc<dyn LoggerPort> {
    build_logger_with_sink(config, Arc::new(StderrLogSink))
}

/// Build a logger writing to `sink`; every line carries `component=entity-stats`.
#[must_use]
pub fn build_logger_with_sink(
    config: &LoggingConfig,
    sink: Arc<dyn LogSink>,
) -> Arc<dyn LoggerPort> {
    let mut base = LogFields::new();
    base.insert("component".into(), Value::from("entity-stats"));

    Arc::new(
        JsonLogger::new(sink)
            .with_base_fields(base)
            .with_min_level(log_level(config.level))
            .with_format(line_format(config.format)),
    )
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> InfraResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let result = match config.format {
        LogFormatSetting::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormatSetting::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
    };

    result.map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("infra", "tracing_init"),
            format!("failed to install tracing subscriber: {error}"),
            ErrorClass::NonRetriable,
        )
    })
}

const fn log_level(level: LogLevelSetting) -> LogLevel {
    match level {
        LogLevelSetting::Debug => LogLevel::Debug,
        LogLevelSetting::Info => LogLevel::Info,
        LogLevelSetting::Warn => LogLevel::Warn,
        LogLevelSetting::Error => LogLevel::Error,
    }
}

const fn line_format(format: LogFormatSetting) -> LineFormat {
    match format {
        LogFormatSetting::Json => LineFormat::Json,
        LogFormatSetting::Pretty => LineFormat::Pretty,
    }
}
