//! Shared collaborators for every stats service, plus log field helpers.

use chrono::{DateTime, Utc};
use entity_stats_domain::{ScopeFilter, ScopeValue, truncate_to_micros};
use entity_stats_ports::{ClockPort, LogFields, LoggerPort, StatsStore, SystemClock};
use entity_stats_shared::{ErrorEnvelope, Result};
use serde_json::Value;
use std::sync::Arc;

/// Dependencies required by builders, writers and queries.
#[derive(Clone)]
pub struct StatsDeps {
    /// Event store adapter.
    pub store: Arc<dyn StatsStore>,
    /// Time source for defaulted timestamps and query windows.
    pub clock: Arc<dyn ClockPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

impl StatsDeps {
    /// Store with the wall clock and no logger.
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            logger: None,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockPort>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LoggerPort>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Clock reading at microsecond precision.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        truncate_to_micros(self.clock.now())
    }

    /// `at` or the clock, at microsecond precision.
    pub(crate) fn instant(&self, at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        at.map_or_else(|| self.now(), truncate_to_micros)
    }

    pub(crate) fn info(&self, event: &str, message: &str, fields: LogFields) {
        if let Some(logger) = self.logger.as_ref() {
            logger.info(event, message, Some(fields));
        }
    }

    pub(crate) fn warn(&self, event: &str, message: &str, fields: LogFields) {
        if let Some(logger) = self.logger.as_ref() {
            logger.warn(event, message, Some(fields));
        }
    }

    /// Pass `result` through, logging `stats.query.failed` on error.
    pub(crate) fn observe_query<T>(
        &self,
        operation: &str,
        mut fields: LogFields,
        result: Result<T>,
    ) -> Result<T> {
        if let (Err(error), Some(logger)) = (result.as_ref(), self.logger.as_ref()) {
            fields.insert("operation".into(), Value::from(operation));
            fields.insert("error".into(), error_json(error));
            logger.error("stats.query.failed", "Stats query failed", Some(fields));
        }
        result
    }
}

impl std::fmt::Debug for StatsDeps {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StatsDeps")
            .field("has_logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn scope_value_json(value: Option<&ScopeValue>) -> Value {
    match value {
        Some(ScopeValue::Integer(value)) => Value::from(*value),
        Some(ScopeValue::Text(value)) => Value::from(value.as_ref()),
        None => Value::Null,
    }
}

pub(crate) fn scope_json(scope: &ScopeFilter) -> Value {
    Value::Object(
        scope
            .iter()
            .map(|(column, value)| (column.as_str().to_owned(), scope_value_json(value)))
            .collect(),
    )
}

fn error_json(error: &ErrorEnvelope) -> Value {
    serde_json::json!({
        "code": error.code.to_string(),
        "message": error.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_stats_domain::ScopeFilter;

    #[test]
    fn scope_json_renders_nulls_and_values() -> Result<()> {
        let scope = ScopeFilter::from_pairs([("user_id", 7_i64)])?
            .try_with("tenant_id", None::<ScopeValue>)?
            .try_with("name", Some(ScopeValue::from("import")))?;

        assert_eq!(
            scope_json(&scope),
            serde_json::json!({"user_id": 7, "tenant_id": null, "name": "import"})
        );
        Ok(())
    }
}
