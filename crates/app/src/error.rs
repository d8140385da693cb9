//! Errors raised by stats services before anything reaches the store.

use entity_stats_shared::ErrorEnvelope;

/// Builder and writer precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// `on()` on a family without tenant support.
    #[error("on() can only be called on tenant-aware stat families; {family} is not tenant-aware")]
    TenantUnsupported {
        /// Counter table of the family.
        family: String,
    },
    /// Neither the call nor the builder supplied a stat name.
    #[error("Stat name is required")]
    MissingStatName,
    /// `decrease` by an amount whose negation overflows.
    #[error("cannot decrease by {amount}: negation overflows")]
    AmountOutOfRange {
        /// Rejected amount.
        amount: i64,
    },
}

impl From<StatsError> for ErrorEnvelope {
    fn from(error: StatsError) -> Self {
        let message = error.to_string();
        match error {
            StatsError::TenantUnsupported { family } => Self::capability(family, message),
            StatsError::MissingStatName => Self::validation("name", message),
            StatsError::AmountOutOfRange { amount } => {
                Self::validation("amount", message).with_metadata("amount", amount.to_string())
            },
        }
    }
}
