//! Result helpers for shared error handling.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for results carrying an [`ErrorEnvelope`].
pub trait ResultExt<T> {
    /// Attach a metadata entry to the error, leaving success untouched.
    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Result<T>;

    /// Prefix the error message with the failing operation name.
    fn context(self, operation: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Result<T> {
        self.map_err(|error| error.with_metadata(key, value))
    }

    fn context(self, operation: &str) -> Result<T> {
        self.map_err(|mut error| {
            error.message = format!("{operation}: {}", error.message);
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCode, ErrorEnvelope};

    #[test]
    fn with_error_metadata_tags_errors_only() {
        let ok: Result<i32> = Ok(1);
        assert!(matches!(ok.with_error_metadata("table", "stats"), Ok(1)));

        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad input");
        let value: Result<i32> = Err(error);
        let tagged = value.with_error_metadata("table", "stats");

        assert!(tagged.is_err());
        if let Err(error) = tagged {
            assert_eq!(
                error.metadata.get("table").map(String::as_str),
                Some("stats")
            );
        }
    }

    #[test]
    fn context_prefixes_the_message() {
        let value: Result<()> = Err(ErrorEnvelope::store("sqlite", "locked"));
        let error = value.context("timing.end").err();
        assert_eq!(
            error.map(|error| error.message),
            Some("timing.end: locked".to_string())
        );
    }
}
