//! Test fixtures for shared error codes and envelopes.

use entity_stats_shared::{ErrorCode, ErrorEnvelope};

/// Return the error codes stats operations surface.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::capability_missing(),
        ErrorCode::validation_failed(),
        ErrorCode::invalid_input(),
        ErrorCode::store("sqlite"),
        ErrorCode::internal(),
    ]
}

/// `on()` against a family without tenant support.
pub fn capability_error() -> ErrorEnvelope {
    ErrorEnvelope::capability("user_stats", "on() can only be called on tenant-aware stat families")
}

/// Missing stat name.
pub fn validation_error() -> ErrorEnvelope {
    ErrorEnvelope::validation("name", "Stat name is required")
}

/// Backend failure as a store adapter would report it.
pub fn store_error() -> ErrorEnvelope {
    ErrorEnvelope::store("sqlite", "sqlite store query failed: disk I/O error")
}
