//! Guarded statement entry points for repositories.
//!
//! A [`Guard`] owns a [`TableConfig`] plus the columns every read and write must
//! restrict. The tenant column is always mandatory; repositories add more (settings
//! also require organization, type and owner type). Rejections happen before any SQL
//! is rendered and are logged at `WARN` under target `pgstmt.guard`.

pub mod session;
pub mod settings;

use crate::change::Changes;
use crate::column::Column;
use crate::condition::{Condition, write_where};
use crate::error::{StmtError, StmtResult};
use crate::query::QueryOpts;
use crate::statement::Statement;
use crate::table::TableConfig;
use crate::update::Update;

/// Restriction checks and statement entry points for one table.
#[derive(Debug, Clone)]
pub struct Guard {
    table: TableConfig,
    mandatory: Vec<Column>,
}

impl Guard {
    /// Guard `table`; its tenant column (if any) is mandatory.
    pub fn new(table: TableConfig) -> Self {
        let mandatory = table.tenant().into_iter().collect();
        Self { table, mandatory }
    }

    /// Add further mandatory columns.
    pub fn mandatory(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        for column in columns {
            if !self.mandatory.contains(&column) {
                self.mandatory.push(column);
            }
        }
        self
    }

    /// A guard that additionally requires every primary key column.
    pub fn require_primary_key(&self) -> Self {
        let primary_key = self.table.primary_key_columns();
        self.clone().mandatory(primary_key)
    }

    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    /// Columns the condition must restrict.
    pub fn mandatory_columns(&self) -> &[Column] {
        &self.mandatory
    }

    /// Fail with [`StmtError::MissingCondition`] on the first mandatory column the
    /// condition does not restrict.
    pub fn check(&self, condition: Option<&Condition>) -> StmtResult<()> {
        for column in &self.mandatory {
            let restricted = condition.is_some_and(|c| c.is_restricting_column(column));
            if !restricted {
                tracing::warn!(
                    target: "pgstmt.guard",
                    table = %self.table.qualified_name(),
                    column = %column,
                    "condition does not restrict mandatory column"
                );
                return Err(StmtError::missing_condition(column));
            }
        }
        Ok(())
    }

    /// `<base> <opts>`, where `base` is the `SELECT … FROM <table>` text.
    pub fn select(&self, base: &str, opts: &QueryOpts) -> StmtResult<Statement> {
        self.check(opts.get_condition())?;
        let mut stmt = Statement::with_sql(base);
        stmt.write(opts);
        Ok(stmt)
    }

    /// `UPDATE <table> SET … WHERE …`, chaining CTE changes when present.
    pub fn update(&self, condition: &Condition, changes: impl Into<Changes>) -> StmtResult<Statement> {
        let changes = changes.into();
        if changes.is_empty() {
            return Err(StmtError::NoChanges);
        }
        self.check(Some(condition))?;
        Update::new(&self.table, condition, changes).build()
    }

    /// `DELETE FROM <table> WHERE …`
    pub fn delete(&self, condition: &Condition) -> StmtResult<Statement> {
        self.check(Some(condition))?;
        let mut stmt = Statement::with_sql("DELETE FROM ");
        self.table.write_qualified(&mut stmt);
        write_where(&mut stmt, condition);
        Ok(stmt)
    }
}
