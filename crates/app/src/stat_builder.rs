//! Counter stats for one owning entity: writes, point-in-time values, series.

use crate::counter_query::CounterQuery;
use crate::deps::{StatsDeps, scope_value_json};
use crate::error::StatsError;
use chrono::{DateTime, Utc};
use entity_stats_domain::{
    CounterEvent, CounterEventKind, CounterScope, NewCounterEvent, ScopeFilter, StatFamily,
    StatName, StatOwner, TenantRef, TenantScope, combine,
};
use entity_stats_ports::LogFields;
use entity_stats_shared::{ErrorEnvelope, Result};
use serde_json::Value;
use std::sync::Arc;

/// Immutable builder binding a stat family to an owner (and maybe a tenant).
///
/// Every step returns a new builder; a builder can be shared and reused.
#[derive(Debug, Clone)]
pub struct StatBuilder {
    deps: StatsDeps,
    scope: CounterScope,
    default_name: Option<StatName>,
}

impl StatBuilder {
    /// Builder for `owner`'s stats in `family`, with no tenant set.
    pub fn for_owner<O>(deps: StatsDeps, family: Arc<StatFamily>, owner: &O) -> Self
    where
        O: StatOwner + ?Sized,
    {
        Self {
            deps,
            scope: CounterScope::new(family, owner.stat_key()),
            default_name: None,
        }
    }

    /// Scope to `tenant`; pass `TenantRef::none()` for an explicit null tenant.
    ///
    /// Fails with a capability error when the family is not tenant-aware.
    pub fn on(&self, tenant: impl Into<TenantRef>) -> Result<Self> {
        let family = self.scope.family();
        if !family.is_tenant_aware() {
            return Err(StatsError::TenantUnsupported {
                family: family.table().as_str().to_owned(),
            }
            .into());
        }

        Ok(Self {
            scope: self
                .scope
                .with_tenant(TenantScope::Explicit(tenant.into().into_value())),
            ..self.clone()
        })
    }

    /// Remember `name` as the default for later calls.
    pub fn stat(&self, name: &str) -> Result<Self> {
        Ok(Self {
            default_name: Some(StatName::parse(name)?),
            ..self.clone()
        })
    }

    /// Bound scope.
    #[must_use]
    pub const fn scope(&self) -> &CounterScope {
        &self.scope
    }

    /// Equality predicate shared by writes and reads.
    #[must_use]
    pub fn filter(&self) -> ScopeFilter {
        self.scope.filter()
    }

    /// Append a `change` of `+amount`.
    pub async fn increase(
        &self,
        name: Option<&str>,
        amount: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<CounterEvent> {
        self.record(name, CounterEventKind::Change, amount, at).await
    }

    /// Append a `change` of `-amount`.
    pub async fn decrease(
        &self,
        name: Option<&str>,
        amount: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<CounterEvent> {
        let delta = amount
            .checked_neg()
            .ok_or(StatsError::AmountOutOfRange { amount })?;
        self.record(name, CounterEventKind::Change, delta, at).await
    }

    /// Append a `set` to the absolute `value`.
    pub async fn set(
        &self,
        name: Option<&str>,
        value: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<CounterEvent> {
        self.record(name, CounterEventKind::Set, value, at).await
    }

    /// Counter value at `as_of` (default: now).
    #[tracing::instrument(
        name = "stats.counter.value",
        skip_all,
        fields(family = %self.scope.family().table())
    )]
    pub async fn value(&self, name: Option<&str>, as_of: Option<DateTime<Utc>>) -> Result<i64> {
        let name = self.resolve_name(name)?;
        let as_of = self.deps.instant(as_of);
        let result = self.value_at(name.clone(), as_of).await;
        self.deps
            .observe_query("counter.value", self.log_fields(&name), result)
    }

    /// Per-period series for a counter.
    pub fn query(&self, name: Option<&str>) -> Result<CounterQuery> {
        let name = self.resolve_name(name)?;
        Ok(CounterQuery::new(
            self.deps.clone(),
            self.scope.family().clone(),
            self.filter(),
            name,
        ))
    }

    async fn value_at(&self, name: StatName, as_of: DateTime<Utc>) -> Result<i64> {
        let family = self.scope.family().clone();
        let filter = self.filter();
        let latest = self
            .deps
            .store
            .latest_set(family.clone(), filter.clone(), name.clone(), as_of)
            .await?;
        let changes = self
            .deps
            .store
            .sum_changes(family, filter, name, latest.as_ref().map(CounterEvent::cursor), as_of)
            .await?;
        Ok(combine(latest.as_ref(), changes))
    }

    async fn record(
        &self,
        name: Option<&str>,
        kind: CounterEventKind,
        value: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<CounterEvent> {
        let name = self.resolve_name(name)?;
        let event = NewCounterEvent {
            name: name.clone(),
            kind,
            value,
            recorded_at: self.deps.instant(at),
        };

        let stored = self
            .deps
            .store
            .insert_counter_event(self.scope.family().clone(), self.filter(), event)
            .await?;

        let mut fields = self.log_fields(&name);
        fields.insert("kind".into(), Value::from(kind.as_str()));
        fields.insert("value".into(), Value::from(value));
        fields.insert("id".into(), Value::from(stored.id));
        self.deps
            .info("stats.counter.recorded", "Counter event recorded", fields);

        Ok(stored)
    }

    fn resolve_name(&self, name: Option<&str>) -> Result<StatName> {
        match (name, self.default_name.as_ref()) {
            (Some(raw), _) => Ok(StatName::parse(raw)?),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(ErrorEnvelope::from(StatsError::MissingStatName)),
        }
    }

    fn log_fields(&self, name: &StatName) -> LogFields {
        let family = self.scope.family();
        let mut fields = LogFields::new();
        fields.insert("family".into(), Value::from(family.table().as_str()));
        fields.insert("name".into(), Value::from(name.as_str()));
        fields.insert("owner".into(), scope_value_json(Some(self.scope.owner())));
        if family.is_tenant_aware() {
            fields.insert("tenant".into(), scope_value_json(self.scope.tenant().value()));
        }
        fields
    }
}
