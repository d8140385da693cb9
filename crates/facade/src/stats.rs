//! Configured entry point bundling a store, a clock and a logger.

use entity_stats_app::{
    NamedTimingStat, StatBuilder, StatsDeps, TimingQuery, TimingWriter, named_timing_table,
};
use entity_stats_config::ValidatedStatsConfig;
use entity_stats_domain::{ScopeFilter, SqlIdentifier, StatFamily, StatOwner, TimingTable};
use entity_stats_ports::{ClockPort, LoggerPort, StatsStore};
use entity_stats_shared::Result;
use std::sync::Arc;

/// Stats services sharing one store, clock and logger.
#[derive(Debug, Clone)]
pub struct Stats {
    deps: StatsDeps,
    timing_table: TimingTable,
    tenant_column: SqlIdentifier,
}

impl Stats {
    /// Build the store and logger described by `config`.
    ///
    /// Server-backed stores connect lazily on first use.
    pub fn from_config(config: &ValidatedStatsConfig) -> Result<Self> {
        let store = entity_stats_infra::build_stats_store(config)?;
        let logger = entity_stats_infra::build_logger(&config.logging);
        let deps = StatsDeps::new(store).with_logger(logger);
        tracing::debug!(
            provider = config.store.provider.as_str(),
            table = config.time_stats_table().as_str(),
            "stats facade ready"
        );
        Self::from_deps(deps, config)
    }

    /// Load config from `STATS_*` env vars plus an optional `.json`/`.toml` file.
    pub fn from_std_env(config_path: Option<&std::path::Path>) -> Result<Self> {
        let config = entity_stats_config::load_stats_config_std_env(config_path)?;
        Self::from_config(&config)
    }

    /// Use caller-supplied collaborators with the table names from `config`.
    pub fn from_deps(deps: StatsDeps, config: &ValidatedStatsConfig) -> Result<Self> {
        Ok(Self {
            deps,
            timing_table: named_timing_table(config.time_stats_table().as_str())?,
            tenant_column: config.tenant_column().clone(),
        })
    }

    /// Replace the store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StatsStore>) -> Self {
        self.deps.store = store;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockPort>) -> Self {
        self.deps = self.deps.with_clock(clock);
        self
    }

    /// Replace the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LoggerPort>) -> Self {
        self.deps = self.deps.with_logger(logger);
        self
    }

    /// Use a timing table with extra scope columns instead of the named one.
    #[must_use]
    pub fn with_timing_table(mut self, table: TimingTable) -> Self {
        self.timing_table = table;
        self
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn deps(&self) -> &StatsDeps {
        &self.deps
    }

    /// Timing table used by writers and queries.
    #[must_use]
    pub const fn timing_table(&self) -> &TimingTable {
        &self.timing_table
    }

    /// A tenant-aware family whose tenant column comes from config.
    pub fn tenant_family(&self, table: &str, owner_key: &str) -> Result<StatFamily> {
        Ok(StatFamily::new(table, owner_key)?
            .tenant_aware()
            .with_tenant_column(self.tenant_column.as_str())?)
    }

    /// Counter builder for `owner` in `family`.
    #[must_use]
    pub fn counter<O>(&self, family: Arc<StatFamily>, owner: &O) -> StatBuilder
    where
        O: StatOwner + ?Sized,
    {
        StatBuilder::for_owner(self.deps.clone(), family, owner)
    }

    /// Timing writer scoped by `attributes`.
    #[must_use]
    pub fn timing_writer(&self, attributes: ScopeFilter) -> TimingWriter {
        TimingWriter::new(self.deps.clone(), self.timing_table.clone(), attributes)
    }

    /// Timing query filtered by `attributes`; an empty filter spans every stream.
    #[must_use]
    pub fn timing_query(&self, attributes: ScopeFilter) -> TimingQuery {
        TimingQuery::new(self.deps.clone(), self.timing_table.clone(), attributes)
    }

    /// Timing stat addressed by `name`.
    pub fn named_timing(&self, name: &str) -> Result<NamedTimingStat> {
        NamedTimingStat::new(self.deps.clone(), self.timing_table.clone(), name)
    }

    /// Create the counter table for `family` if it does not exist.
    pub async fn ensure_counter_table(&self, family: &StatFamily) -> Result<()> {
        self.deps.store.ensure_counter_table(family.clone()).await
    }

    /// Create the timing table if it does not exist.
    pub async fn ensure_timing_table(&self) -> Result<()> {
        self.deps
            .store
            .ensure_timing_table(self.timing_table.clone())
            .await
    }
}
