//! Table configuration.
//!
//! Repositories receive a [`TableConfig`] in their constructor instead of relying on
//! global table-name constants, so the same code runs against any schema:
//!
//! ```ignore
//! use pgstmt::TableConfig;
//!
//! let sessions = TableConfig::new("zitadel", "sessions")?
//!     .tenant_column("instance_id")?
//!     .primary_key(["instance_id", "id"])?;
//!
//! assert_eq!(sessions.qualified_name(), "zitadel.sessions");
//! # Ok::<(), pgstmt::StmtError>(())
//! ```
//!
//! Identifiers are validated against `[A-Za-z_][A-Za-z0-9_$]*` because they are
//! written into SQL text verbatim.

use crate::column::Column;
use crate::error::{StmtError, StmtResult};
use crate::statement::Statement;
use std::sync::Arc;

/// Default name of the snapshot CTE used by chained updates.
pub const DEFAULT_SNAPSHOT_NAME: &str = "existing_row";

/// Default audit timestamp column.
pub const DEFAULT_UPDATED_AT: &str = "updated_at";

/// Validate a single unquoted SQL identifier.
pub fn validate_ident(ident: &str) -> StmtResult<()> {
    let mut chars = ident.chars();
    let Some(first) = chars.next() else {
        return Err(StmtError::validation("Identifier cannot be empty"));
    };
    if !(first == '_' || first.is_ascii_alphabetic()) {
        return Err(StmtError::validation(format!(
            "Invalid identifier '{ident}': must start with a letter or '_'"
        )));
    }
    if !chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric()) {
        return Err(StmtError::validation(format!(
            "Invalid identifier '{ident}': only [A-Za-z0-9_$] allowed"
        )));
    }
    Ok(())
}

fn ident(value: &str) -> StmtResult<Arc<str>> {
    validate_ident(value)?;
    Ok(Arc::from(value))
}

/// Schema, table and key layout of one entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    schema: Arc<str>,
    name: Arc<str>,
    primary_key: Vec<Arc<str>>,
    tenant_column: Option<Arc<str>>,
    updated_at_column: Option<Arc<str>>,
    snapshot_name: Arc<str>,
}

impl TableConfig {
    /// Create a configuration for `schema.name`.
    ///
    /// Defaults: no primary key, no tenant column, `updated_at` as audit column and
    /// `existing_row` as snapshot name.
    pub fn new(schema: &str, name: &str) -> StmtResult<Self> {
        Ok(Self {
            schema: ident(schema)?,
            name: ident(name)?,
            primary_key: Vec::new(),
            tenant_column: None,
            updated_at_column: Some(Arc::from(DEFAULT_UPDATED_AT)),
            snapshot_name: Arc::from(DEFAULT_SNAPSHOT_NAME),
        })
    }

    /// Set the primary key columns, in key order.
    pub fn primary_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> StmtResult<Self> {
        self.primary_key = columns.into_iter().map(ident).collect::<StmtResult<_>>()?;
        Ok(self)
    }

    /// Set the tenant-scoping column every read and write must restrict.
    pub fn tenant_column(mut self, column: &str) -> StmtResult<Self> {
        self.tenant_column = Some(ident(column)?);
        Ok(self)
    }

    /// Set the audit timestamp column touched by every update.
    pub fn updated_at_column(mut self, column: &str) -> StmtResult<Self> {
        self.updated_at_column = Some(ident(column)?);
        Ok(self)
    }

    /// Disable the automatic audit timestamp.
    pub fn without_updated_at(mut self) -> Self {
        self.updated_at_column = None;
        self
    }

    /// Override the snapshot CTE name.
    pub fn snapshot_name(mut self, name: &str) -> StmtResult<Self> {
        self.snapshot_name = ident(name)?;
        Ok(self)
    }

    /// Schema name.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Unqualified table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `schema.table`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Write `schema.table`.
    pub fn write_qualified(&self, stmt: &mut Statement) {
        stmt.write_str(&self.schema);
        stmt.write_char('.');
        stmt.write_str(&self.name);
    }

    /// A column of this table.
    pub fn column(&self, name: &str) -> Column {
        Column::new(self.name.clone(), name)
    }

    /// Primary key columns, in key order.
    pub fn primary_key_columns(&self) -> Vec<Column> {
        self.primary_key
            .iter()
            .map(|name| Column::new(self.name.clone(), name.clone()))
            .collect()
    }

    /// The tenant column, if configured.
    pub fn tenant(&self) -> Option<Column> {
        self.tenant_column
            .as_ref()
            .map(|name| Column::new(self.name.clone(), name.clone()))
    }

    /// The audit timestamp column, if configured.
    pub fn updated_at(&self) -> Option<Column> {
        self.updated_at_column
            .as_ref()
            .map(|name| Column::new(self.name.clone(), name.clone()))
    }

    /// Name of the snapshot CTE used by chained updates.
    pub fn snapshot(&self) -> &str {
        &self.snapshot_name
    }
}
