//! Domain primitives with validated constructors.

use entity_stats_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier accepted for table and column names.
pub const MAX_SQL_IDENTIFIER_LEN: usize = 64;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    /// `StatName` is empty after trimming.
    #[error("Stat name is required")]
    EmptyStatName {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `TimingIdentifier` is empty after trimming.
    #[error("Timing identifier is required")]
    EmptyTimingIdentifier {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// Table or column name violates the identifier pattern.
    #[error("SQL identifier must match /^[A-Za-z_][A-Za-z0-9_]*$/ and be at most 64 chars")]
    InvalidSqlIdentifier {
        /// Identifier that failed validation.
        input: String,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyStatName { .. } | Self::EmptyTimingIdentifier { .. } => {
                ErrorCode::validation_failed()
            },
            Self::InvalidSqlIdentifier { .. } => ErrorCode::invalid_input(),
        }
    }
}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            PrimitiveError::EmptyStatName { input_length } => envelope
                .with_metadata("field", "name")
                .with_metadata("input_length", input_length.to_string()),
            PrimitiveError::EmptyTimingIdentifier { input_length } => envelope
                .with_metadata("field", "identifier")
                .with_metadata("input_length", input_length.to_string()),
            PrimitiveError::InvalidSqlIdentifier { input } => {
                envelope.with_metadata("input", input)
            },
        }
    }
}

/// Name of a counter within a stat family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatName(Box<str>);

impl StatName {
    /// Parse a stat name; blank input is rejected, anything else is kept verbatim.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        if raw.trim().is_empty() {
            return Err(PrimitiveError::EmptyStatName {
                input_length: raw.len(),
            });
        }

        Ok(Self(raw.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StatName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for StatName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Correlates a `start` timing event with its eventual `completed` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingIdentifier(Box<str>);

impl TimingIdentifier {
    /// Parse a timing identifier; blank input is rejected.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        if raw.trim().is_empty() {
            return Err(PrimitiveError::EmptyTimingIdentifier {
                input_length: raw.len(),
            });
        }

        Ok(Self(raw.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimingIdentifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Table or column name that is safe to interpolate into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdentifier(Box<str>);

impl SqlIdentifier {
    /// Parse an identifier matching `^[A-Za-z_][A-Za-z0-9_]*$`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        if !is_valid_sql_identifier(raw) {
            return Err(PrimitiveError::InvalidSqlIdentifier {
                input: raw.to_owned(),
            });
        }

        Ok(Self(raw.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SqlIdentifier {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SqlIdentifier> for String {
    fn from(value: SqlIdentifier) -> Self {
        value.0.into_string()
    }
}

impl AsRef<str> for SqlIdentifier {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Value stored in a scope column (owner key, tenant key, or timing attribute).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    /// Integer key (the common foreign-key case).
    Integer(i64),
    /// Text key.
    Text(Box<str>),
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ScopeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for ScopeValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned().into_boxed_str())
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        Self::Text(value.into_boxed_str())
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::Text(value) => formatter.write_str(value),
        }
    }
}

fn is_valid_sql_identifier(input: &str) -> bool {
    if input.is_empty() || input.len() > MAX_SQL_IDENTIFIER_LEN {
        return false;
    }
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn stat_name_rejects_blank_input() {
        let error = StatName::parse("   ").err();
        assert!(matches!(
            error,
            Some(PrimitiveError::EmptyStatName { input_length: 3 })
        ));
    }

    #[test]
    fn stat_names_keep_surrounding_whitespace() -> Result<(), PrimitiveError> {
        let padded = StatName::parse("logins ")?;
        assert_eq!(padded.as_str(), "logins ");
        assert_ne!(padded, StatName::parse("logins")?);
        Ok(())
    }

    #[test]
    fn stat_name_error_maps_to_validation_envelope() {
        let envelope: ErrorEnvelope = PrimitiveError::EmptyStatName { input_length: 0 }.into();
        assert!(envelope.is_validation_error());
        assert_eq!(envelope.message, "Stat name is required");
        assert_eq!(
            envelope.metadata.get("field").map(String::as_str),
            Some("name")
        );
    }

    #[test]
    fn sql_identifier_rejects_injection() {
        for input in ["user_stats; DROP TABLE x", "1stats", "", "tenant-id", "a b"] {
            assert!(SqlIdentifier::parse(input).is_err(), "accepted {input:?}");
        }
        let too_long = "a".repeat(MAX_SQL_IDENTIFIER_LEN + 1);
        assert!(SqlIdentifier::parse(too_long).is_err());
    }

    #[test]
    fn scope_value_displays_raw_key() {
        assert_eq!(ScopeValue::from(42_i64).to_string(), "42");
        assert_eq!(ScopeValue::from("acme").to_string(), "acme");
    }

    proptest! {
        #[test]
        fn sql_identifier_accepts_valid_inputs(name in "[A-Za-z_][A-Za-z0-9_]{0,40}") {
            let parsed = SqlIdentifier::parse(&name);
            prop_assert!(parsed.is_ok());
        }
    }
}
