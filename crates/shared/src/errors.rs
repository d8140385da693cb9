//! The error envelope every stats boundary returns.
//!
//! Codes are `namespace:code` pairs. Stat operations use the `stats`
//! namespace, store adapters use `store:<backend>`, and config uses `config`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, io};

/// Diagnostic key/value pairs attached to an error.
pub type ErrorMetadata = BTreeMap<String, String>;

/// Placeholder written over redacted metadata values.
pub const REDACTED_VALUE: &str = "<redacted>";

/// Whether a failure was anticipated by the caller's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or a missing capability; raised before any write.
    Expected,
    /// Store, runtime or serialization failure.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Expected => "expected",
            Self::Unexpected => "unexpected",
        })
    }
}

/// Whether repeating the call may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the same call can be retried.
    Retriable,
    /// Retrying the same call fails the same way.
    NonRetriable,
}

impl ErrorClass {
    /// True for [`ErrorClass::Retriable`].
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Retriable => "retriable",
            Self::NonRetriable => "non-retriable",
        })
    }
}

/// Stable `namespace:code` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Code in `namespace`.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// The bound stat family lacks a capability the call needs.
    pub fn capability_missing() -> Self {
        Self::new("stats", "capability_missing")
    }

    /// A required identifying argument was missing or malformed.
    pub fn validation_failed() -> Self {
        Self::new("stats", "validation_failed")
    }

    /// Store-level failure for the named backend (e.g. `sqlite`).
    pub fn store(backend: impl Into<String>) -> Self {
        Self::new("store", backend)
    }

    /// A value could not be used as a SQL identifier or scope value.
    pub fn invalid_input() -> Self {
        Self::new("core", "invalid_input")
    }

    /// File system failure outside a store.
    pub fn io() -> Self {
        Self::new("core", "io")
    }

    /// Anything else.
    pub fn internal() -> Self {
        Self::new("core", "internal")
    }

    /// Namespace part.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Code part.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error shared by every crate in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Expected or unexpected.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Diagnostic metadata (table, family, field, backend...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    fn build(kind: ErrorKind, class: ErrorClass, code: ErrorCode, message: String) -> Self {
        Self {
            kind,
            class,
            code,
            message,
            metadata: ErrorMetadata::new(),
        }
    }

    /// Non-retriable expected error.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Expected, ErrorClass::NonRetriable, code, message.into())
    }

    /// Unexpected error with an explicit retry class.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self::build(ErrorKind::Unexpected, class, code, message.into())
    }

    /// Capability error raised before any write, tagged with the stat family.
    pub fn capability(family: impl Into<String>, message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::capability_missing(), message).with_metadata("family", family)
    }

    /// Validation error raised before any write, tagged with the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::validation_failed(), message).with_metadata("field", field)
    }

    /// Non-retriable store failure for `backend`; callers never retry it.
    pub fn store(backend: &str, message: impl Into<String>) -> Self {
        Self::unexpected(ErrorCode::store(backend), message, ErrorClass::NonRetriable)
            .with_metadata("backend", backend)
    }

    /// True for missing-capability failures.
    #[must_use]
    pub fn is_capability_error(&self) -> bool {
        self.code == ErrorCode::capability_missing()
    }

    /// True for validation failures.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.code == ErrorCode::validation_failed()
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overwrite the listed metadata values with [`REDACTED_VALUE`].
    #[must_use]
    pub fn redact_metadata(self, keys: &[&str]) -> Self {
        Self {
            metadata: redact_metadata(self.metadata, keys),
            ..self
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind, self.class, self.code, self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<io::Error> for ErrorEnvelope {
    fn from(error: io::Error) -> Self {
        normalize_unexpected_error(UnexpectedError::error(error))
    }
}

/// Overwrite the listed keys' values with [`REDACTED_VALUE`].
#[must_use]
pub fn redact_metadata(mut metadata: ErrorMetadata, keys: &[&str]) -> ErrorMetadata {
    for key in keys {
        if let Some(value) = metadata.get_mut(*key) {
            REDACTED_VALUE.clone_into(value);
        }
    }
    metadata
}

/// A foreign failure before it is shaped into an envelope.
#[derive(Debug)]
pub enum UnexpectedError {
    /// Bare message.
    Message(String),
    /// Boxed error value; its source chain is inspected.
    Error(Box<dyn std::error::Error + Send + Sync>),
}

impl UnexpectedError {
    /// Wrap a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap an error value.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Error(Box::new(error))
    }
}

/// Shape a foreign failure into an unexpected envelope.
///
/// An [`io::Error`] anywhere in the source chain yields `core:io`, retriable
/// when the I/O kind is transient. Everything else is `core:internal`.
pub fn normalize_unexpected_error(error: UnexpectedError) -> ErrorEnvelope {
    match error {
        UnexpectedError::Message(message) => {
            ErrorEnvelope::unexpected(ErrorCode::internal(), message, ErrorClass::NonRetriable)
        },
        UnexpectedError::Error(error) => {
            let message = error.to_string();
            match io_kind_in_chain(&*error) {
                Some(kind) => ErrorEnvelope::unexpected(ErrorCode::io(), message, io_class(kind))
                    .with_metadata("io_kind", kind.to_string()),
                None => ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    message,
                    ErrorClass::NonRetriable,
                ),
            }
        },
    }
}

fn io_kind_in_chain(error: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(error);
    while let Some(candidate) = current {
        if let Some(io_error) = candidate.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        current = candidate.source();
    }
    None
}

const fn io_class(kind: io::ErrorKind) -> ErrorClass {
    match kind {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
            ErrorClass::Retriable
        },
        _ => ErrorClass::NonRetriable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_and_validation_errors_are_distinguishable() {
        let capability = ErrorEnvelope::capability(
            "user_stats",
            "on() can only be called on tenant-aware stat families",
        );
        assert!(capability.is_capability_error());
        assert!(!capability.is_validation_error());
        assert_eq!(capability.kind, ErrorKind::Expected);
        assert_eq!(
            capability.metadata.get("family").map(String::as_str),
            Some("user_stats")
        );

        let validation = ErrorEnvelope::validation("name", "Stat name is required");
        assert!(validation.is_validation_error());
        assert_eq!(
            validation.to_string(),
            "expected non-retriable stats:validation_failed: Stat name is required"
        );
    }

    #[test]
    fn store_errors_are_namespaced_by_backend() {
        let error = ErrorEnvelope::store("sqlite", "sqlite store insert failed: disk I/O error");
        assert_eq!(error.kind, ErrorKind::Unexpected);
        assert_eq!(error.code.to_string(), "store:sqlite");
        assert_eq!(error.metadata.get("backend").map(String::as_str), Some("sqlite"));
        assert!(!error.class.is_retriable());
    }

    #[test]
    fn io_errors_in_the_source_chain_become_io_codes() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
        let envelope = normalize_unexpected_error(UnexpectedError::error(timed_out));
        assert_eq!(envelope.code, ErrorCode::io());
        assert!(envelope.class.is_retriable());

        let missing: ErrorEnvelope = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(missing.code, ErrorCode::io());
        assert!(!missing.class.is_retriable());

        let envelope = normalize_unexpected_error(UnexpectedError::message("boom"));
        assert_eq!(envelope.code, ErrorCode::internal());
    }

    #[test]
    fn listed_metadata_is_redacted() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad")
            .with_metadata("connection", "postgres://stats:hunter2@db/stats") // pragma: allowlist secret
            .with_metadata("table", "time_stats_events")
            .redact_metadata(&["connection", "absent"]);

        assert_eq!(
            error.metadata.get("connection").map(String::as_str),
            Some(REDACTED_VALUE)
        );
        assert_eq!(
            error.metadata.get("table").map(String::as_str),
            Some("time_stats_events")
        );
        assert!(!error.metadata.contains_key("absent"));
    }
}
