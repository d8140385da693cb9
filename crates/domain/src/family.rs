//! Table descriptors for counter families and timing streams.

use crate::primitives::{PrimitiveError, SqlIdentifier};
use serde::{Deserialize, Serialize};

/// Default tenant column for tenant-aware families.
pub const DEFAULT_TENANT_COLUMN: &str = "tenant_id";

/// Default table holding timing events.
pub const DEFAULT_TIMING_TABLE: &str = "time_stats_events";

/// Descriptor of one counter family: its table, owner key, and capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatFamily {
    table: SqlIdentifier,
    owner_key: SqlIdentifier,
    tenant_key: SqlIdentifier,
    tenant_aware: bool,
}

impl StatFamily {
    /// Describe a family stored in `table` and owned through `owner_key`.
    pub fn new(table: &str, owner_key: &str) -> Result<Self, PrimitiveError> {
        Ok(Self {
            table: SqlIdentifier::parse(table)?,
            owner_key: SqlIdentifier::parse(owner_key)?,
            tenant_key: SqlIdentifier::parse(DEFAULT_TENANT_COLUMN)?,
            tenant_aware: false,
        })
    }

    /// Mark the family as tenant-scoped.
    #[must_use]
    pub const fn tenant_aware(mut self) -> Self {
        self.tenant_aware = true;
        self
    }

    /// Override the tenant column name.
    pub fn with_tenant_column(mut self, column: &str) -> Result<Self, PrimitiveError> {
        self.tenant_key = SqlIdentifier::parse(column)?;
        Ok(self)
    }

    /// Whether `on(tenant)` is allowed and tenant predicates apply.
    #[must_use]
    pub const fn is_tenant_aware(&self) -> bool {
        self.tenant_aware
    }

    /// Table name.
    #[must_use]
    pub const fn table(&self) -> &SqlIdentifier {
        &self.table
    }

    /// Owner foreign-key column.
    #[must_use]
    pub const fn owner_key(&self) -> &SqlIdentifier {
        &self.owner_key
    }

    /// Tenant column (only meaningful when tenant-aware).
    #[must_use]
    pub const fn tenant_key(&self) -> &SqlIdentifier {
        &self.tenant_key
    }
}

/// Storage type of a timing scope column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// 64-bit integer (foreign keys).
    BigInt,
    /// Free text (stat names, slugs).
    Text,
}

/// One scope column on a timing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeColumn {
    /// Column name.
    pub name: SqlIdentifier,
    /// Column type.
    pub kind: ColumnKind,
}

/// Shape of a timing events table: its name and its scope columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingTable {
    name: SqlIdentifier,
    scope_columns: Vec<ScopeColumn>,
}

impl TimingTable {
    /// Table with no scope columns yet.
    pub fn new(name: &str) -> Result<Self, PrimitiveError> {
        Ok(Self {
            name: SqlIdentifier::parse(name)?,
            scope_columns: Vec::new(),
        })
    }

    /// Add a scope column.
    pub fn with_column(mut self, name: &str, kind: ColumnKind) -> Result<Self, PrimitiveError> {
        self.scope_columns.push(ScopeColumn {
            name: SqlIdentifier::parse(name)?,
            kind,
        });
        Ok(self)
    }

    /// Table name.
    #[must_use]
    pub const fn name(&self) -> &SqlIdentifier {
        &self.name
    }

    /// Scope columns in declaration order.
    #[must_use]
    pub fn scope_columns(&self) -> &[ScopeColumn] {
        &self.scope_columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_not_tenant_aware_by_default() -> Result<(), PrimitiveError> {
        let family = StatFamily::new("user_stats", "user_id")?;
        assert!(!family.is_tenant_aware());
        assert!(family.tenant_aware().is_tenant_aware());
        Ok(())
    }

    #[test]
    fn tenant_column_is_configurable_and_validated() -> Result<(), PrimitiveError> {
        let family = StatFamily::new("tenant_stats", "user_id")?
            .tenant_aware()
            .with_tenant_column("team_id")?;
        assert_eq!(family.tenant_key().as_str(), "team_id");
        assert!(StatFamily::new("tenant_stats", "user id").is_err());
        Ok(())
    }
}
