//! # entity-stats-infra
//!
//! Infrastructure wiring and runtime composition: config in, store and
//! logger out. This crate depends on `app`, `adapters`, `config`, and `shared`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Config loading helpers.
pub mod config_check;
/// Environment validation helpers.
pub mod env_check;
/// Logger and tracing setup.
pub mod logging;
/// Store adapter selection.
mod store_factory;

pub use config_check::load_effective_config_json;
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use logging::{build_logger, build_logger_with_sink, init_tracing};
pub use store_factory::build_stats_store;

// Re-export redaction utilities for boundary sanitization
pub use entity_stats_shared::{is_secret_key, redact_if_secret};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
