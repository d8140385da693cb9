//! Structured JSON logger adapter.

use crate::log_sink::LogSink;
use chrono::{SecondsFormat, Utc};
use entity_stats_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use entity_stats_shared::redaction::{REDACTED, is_secret_key};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;

/// Line layout written to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// `timestamp LEVEL event: message key=value ...` for terminals.
    Pretty,
}

/// Logger emitting one line per event, with secret-looking keys redacted.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
    format: LineFormat,
}

impl JsonLogger {
    /// Create a logger backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
            format: LineFormat::Json,
        }
    }

    /// Set base fields applied to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }

    /// Set the minimum log level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Set the line layout.
    #[must_use]
    pub const fn with_format(mut self, format: LineFormat) -> Self {
        self.format = format;
        self
    }

    fn render_json(
        timestamp: String,
        event: &LogEvent,
        fields: LogFields,
        error: Option<Value>,
    ) -> String {
        let mut payload = Map::new();
        payload.insert("timestamp".to_owned(), Value::String(timestamp));
        payload.insert("level".to_owned(), Value::from(event.level.as_str()));
        payload.insert("event".to_owned(), Value::from(event.event.as_ref()));
        payload.insert("message".to_owned(), Value::from(event.message.as_ref()));
        if !fields.is_empty() {
            payload.insert("fields".to_owned(), fields_to_json(fields));
        }
        if let Some(error) = error {
            payload.insert("error".to_owned(), error);
        }

        serde_json::to_string(&Value::Object(payload)).map_or_else(
            |_| {
                "{\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n"
                    .to_owned()
            },
            |mut encoded| {
                encoded.push('\n');
                encoded
            },
        )
    }

    fn render_pretty(
        timestamp: &str,
        event: &LogEvent,
        fields: &LogFields,
        error: Option<&Value>,
    ) -> String {
        let mut line = format!(
            "{timestamp} {:<5} {}: {}",
            event.level.as_str().to_ascii_uppercase(),
            event.event,
            event.message
        );
        for (key, value) in fields {
            let _ = write!(line, " {key}={value}");
        }
        if let Some(error) = error {
            let _ = write!(line, " error={error}");
        }
        line.push('\n');
        line
    }
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let mut fields = self.base_fields.clone();
        if let Some(extra) = event.fields.clone() {
            fields.extend(extra);
        }
        redact_fields(&mut fields);

        let mut error = event.error.clone();
        if let Some(value) = error.as_mut() {
            redact_value(value);
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = match self.format {
            LineFormat::Json => Self::render_json(timestamp, &event, fields, error),
            LineFormat::Pretty => Self::render_pretty(&timestamp, &event, &fields, error.as_ref()),
        };
        self.sink.write_line(&line);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged,
            min_level: self.min_level,
            format: self.format,
        })
    }
}

fn fields_to_json(fields: LogFields) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.into_string(), value))
            .collect(),
    )
}

fn redact_fields(fields: &mut LogFields) {
    for (key, value) in fields.iter_mut() {
        if is_secret_key(key) {
            *value = Value::String(REDACTED.to_owned());
        } else {
            redact_value(value);
        }
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_secret_key(key) {
                    *nested = Value::String(REDACTED.to_owned());
                } else {
                    redact_value(nested);
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {},
    }
}
