//! Scope filters: the equality predicate shared by writers and readers.

use crate::family::StatFamily;
use crate::primitives::{PrimitiveError, ScopeValue, SqlIdentifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered column → value equality predicate; `None` means `IS NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeFilter {
    entries: BTreeMap<SqlIdentifier, Option<ScopeValue>>,
}

impl ScopeFilter {
    /// Empty filter (matches every row).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a column predicate.
    #[must_use]
    pub fn with(mut self, column: SqlIdentifier, value: Option<ScopeValue>) -> Self {
        self.entries.insert(column, value);
        self
    }

    /// Add a column predicate from a raw column name.
    pub fn try_with(
        self,
        column: &str,
        value: impl Into<Option<ScopeValue>>,
    ) -> Result<Self, PrimitiveError> {
        Ok(self.with(SqlIdentifier::parse(column)?, value.into()))
    }

    /// Build a filter from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, PrimitiveError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ScopeValue>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |filter, (column, value)| {
                filter.try_with(column.as_ref(), Some(value.into()))
            })
    }

    /// Iterate predicates in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&SqlIdentifier, Option<&ScopeValue>)> {
        self.entries
            .iter()
            .map(|(column, value)| (column, value.as_ref()))
    }

    /// Look up the predicate for a column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<Option<&ScopeValue>> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_str() == column)
            .map(|(_, value)| value.as_ref())
    }

    /// Number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no predicates are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `row` satisfies every predicate; a column absent from `row` is NULL.
    #[must_use]
    pub fn matches(&self, row: &Self) -> bool {
        self.entries
            .iter()
            .all(|(column, expected)| match row.entries.get(column) {
                Some(actual) => actual == expected,
                None => expected.is_none(),
            })
    }
}

/// Anything that can own stats (or act as a tenant).
pub trait StatOwner {
    /// Key stored in the owner (or tenant) column.
    fn stat_key(&self) -> ScopeValue;
}

impl StatOwner for i64 {
    fn stat_key(&self) -> ScopeValue {
        ScopeValue::Integer(*self)
    }
}

impl StatOwner for ScopeValue {
    fn stat_key(&self) -> ScopeValue {
        self.clone()
    }
}

impl StatOwner for str {
    fn stat_key(&self) -> ScopeValue {
        ScopeValue::from(self)
    }
}

/// Tenant argument accepted by `on()`: an entity, a raw key, or explicit null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRef(Option<ScopeValue>);

impl TenantRef {
    /// Explicit "no tenant".
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Resolved tenant key.
    #[must_use]
    pub fn into_value(self) -> Option<ScopeValue> {
        self.0
    }
}

impl<T: StatOwner + ?Sized> From<&T> for TenantRef {
    fn from(value: &T) -> Self {
        Self(Some(value.stat_key()))
    }
}

impl From<i64> for TenantRef {
    fn from(value: i64) -> Self {
        Self(Some(ScopeValue::Integer(value)))
    }
}

impl From<Option<i64>> for TenantRef {
    fn from(value: Option<i64>) -> Self {
        Self(value.map(ScopeValue::Integer))
    }
}

impl From<ScopeValue> for TenantRef {
    fn from(value: ScopeValue) -> Self {
        Self(Some(value))
    }
}

impl From<Option<ScopeValue>> for TenantRef {
    fn from(value: Option<ScopeValue>) -> Self {
        Self(value)
    }
}

/// Tenant state of a counter scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TenantScope {
    /// `on()` was never called.
    #[default]
    Unset,
    /// `on()` was called; `None` is an explicit null tenant.
    Explicit(Option<ScopeValue>),
}

impl TenantScope {
    /// Tenant key used in predicates; both unset and explicit null map to NULL.
    #[must_use]
    pub const fn value(&self) -> Option<&ScopeValue> {
        match self {
            Self::Unset | Self::Explicit(None) => None,
            Self::Explicit(Some(value)) => Some(value),
        }
    }
}

/// A stat family bound to one owner (and tenant, when the family allows it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterScope {
    family: Arc<StatFamily>,
    owner: ScopeValue,
    tenant: TenantScope,
}

impl CounterScope {
    /// Bind a family to an owner with no tenant set.
    #[must_use]
    pub fn new(family: Arc<StatFamily>, owner: ScopeValue) -> Self {
        Self {
            family,
            owner,
            tenant: TenantScope::Unset,
        }
    }

    /// Return a copy with the tenant scope replaced.
    ///
    /// Callers must check [`StatFamily::is_tenant_aware`] first; the scope
    /// itself simply ignores tenants for families without the capability.
    #[must_use]
    pub fn with_tenant(&self, tenant: TenantScope) -> Self {
        Self {
            family: Arc::clone(&self.family),
            owner: self.owner.clone(),
            tenant,
        }
    }

    /// Bound family.
    #[must_use]
    pub fn family(&self) -> &StatFamily {
        &self.family
    }

    /// Owner key.
    #[must_use]
    pub const fn owner(&self) -> &ScopeValue {
        &self.owner
    }

    /// Tenant state.
    #[must_use]
    pub const fn tenant(&self) -> &TenantScope {
        &self.tenant
    }

    /// Canonical predicate: `{owner_fk: owner, [tenant_col: tenant-or-null]}`.
    ///
    /// The tenant entry only appears for tenant-aware families, so a family
    /// whose own foreign key is called `tenant_id` is never tenant-filtered.
    #[must_use]
    pub fn filter(&self) -> ScopeFilter {
        let filter = ScopeFilter::new().with(
            self.family.owner_key().clone(),
            Some(self.owner.clone()),
        );
        if self.family.is_tenant_aware() {
            filter.with(
                self.family.tenant_key().clone(),
                self.tenant.value().cloned(),
            )
        } else {
            filter
        }
    }
}
