//! Event store selection and initialization.

use crate::InfraResult;
use entity_stats_adapters::SqliteStatsStore;
use entity_stats_config::{StoreProvider, ValidatedStatsConfig};
use entity_stats_ports::StatsStore;
use entity_stats_shared::{ErrorCode, ErrorEnvelope, SecretString};
use std::sync::Arc;

#[cfg(feature = "store-mysql")]
use entity_stats_adapters::MySqlStatsStore;
#[cfg(feature = "store-postgres")]
use entity_stats_adapters::PostgresStatsStore;

/// Build the configured stats store.
///
/// Server providers connect lazily, so this never touches the network.
pub fn build_stats_store(config: &ValidatedStatsConfig) -> InfraResult<Arc<dyn StatsStore>> {
    let provider = config.store.provider;
    tracing::debug!(provider = provider.as_str(), "building stats store");

    match provider {
        StoreProvider::Sqlite => Ok(Arc::new(SqliteStatsStore::new(config.store.path.clone()))),
        StoreProvider::Postgres => build_postgres(require_connection(config)?),
        StoreProvider::Mysql => build_mysql(require_connection(config)?),
    }
}

fn require_connection(config: &ValidatedStatsConfig) -> InfraResult<&SecretString> {
    config.store.connection.as_ref().ok_or_else(|| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "missing_connection"),
            format!("store.connection is required for {}", config.store.provider),
        )
        .with_metadata("provider", config.store.provider.as_str())
    })
}

#[cfg(feature = "store-postgres")]
fn build_postgres(connection: &SecretString) -> InfraResult<Arc<dyn StatsStore>> {
    Ok(Arc::new(PostgresStatsStore::new(connection.expose())?))
}

#[cfg(not(feature = "store-postgres"))]
fn build_postgres(_connection: &SecretString) -> InfraResult<Arc<dyn StatsStore>> {
    Err(provider_disabled(StoreProvider::Postgres, "store-postgres"))
}

#[cfg(feature = "store-mysql")]
fn build_mysql(connection: &SecretString) -> InfraResult<Arc<dyn StatsStore>> {
    Ok(Arc::new(MySqlStatsStore::new(connection.expose())?))
}

#[cfg(not(feature = "store-mysql"))]
fn build_mysql(_connection: &SecretString) -> InfraResult<Arc<dyn StatsStore>> {
    Err(provider_disabled(StoreProvider::Mysql, "store-mysql"))
}

#[cfg(any(not(feature = "store-postgres"), not(feature = "store-mysql")))]
fn provider_disabled(provider: StoreProvider, feature: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("store", "provider_disabled"),
        format!("{provider} store is not enabled in this build"),
    )
    .with_metadata("provider", provider.as_str())
    .with_metadata("feature", feature)
}
