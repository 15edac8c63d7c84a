//! `INSERT` statements.
//!
//! Values are [`Value`]s, so an insert slot can be a bound argument or an
//! instruction (`DEFAULT`, `NOW()`, `NULL`):
//!
//! ```ignore
//! use pgstmt::{Insert, Value};
//!
//! let stmt = Insert::new(&sessions)
//!     .value(sessions.column("instance_id"), Value::bind("i1"))
//!     .value(sessions.column("id"), Value::bind("s1"))
//!     .value(sessions.column("created_at"), Value::Default)
//!     .returning(["created_at", "updated_at"])
//!     .build()?;
//! ```

use crate::change::Changes;
use crate::column::Column;
use crate::cte::{CteChange, CteContext};
use crate::error::{StmtError, StmtResult};
use crate::statement::{Statement, WriteSql};
use crate::table::TableConfig;
use crate::value::Value;

/// Conflict resolution action.
#[derive(Debug, Clone)]
pub enum ConflictAction {
    /// DO NOTHING
    DoNothing,
    /// DO UPDATE SET <changes>
    DoUpdate(Changes),
}

#[derive(Debug, Clone)]
struct OnConflict {
    target: Vec<Column>,
    action: ConflictAction,
}

/// Builder for one `INSERT` statement.
#[derive(Debug, Clone)]
pub struct Insert<'a> {
    table: &'a TableConfig,
    ctes: Vec<(String, CteChange)>,
    columns: Vec<Column>,
    values: Vec<Value>,
    on_conflict: Option<OnConflict>,
    returning: Vec<String>,
}

impl<'a> Insert<'a> {
    pub fn new(table: &'a TableConfig) -> Self {
        Self {
            table,
            ctes: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    /// Prefix the insert with `WITH <name> AS (<cte>)`.
    pub fn with(mut self, name: impl Into<String>, cte: CteChange) -> Self {
        self.ctes.push((name.into(), cte));
        self
    }

    /// Add a column and its value.
    pub fn value(mut self, column: Column, value: Value) -> Self {
        self.columns.push(column);
        self.values.push(value);
        self
    }

    /// `ON CONFLICT (<target>) <action>`
    pub fn on_conflict(mut self, target: impl IntoIterator<Item = Column>, action: ConflictAction) -> Self {
        self.on_conflict = Some(OnConflict {
            target: target.into_iter().collect(),
            action,
        });
        self
    }

    /// `RETURNING <columns>`
    pub fn returning<'c>(mut self, columns: impl IntoIterator<Item = &'c str>) -> Self {
        self.returning = columns.into_iter().map(str::to_string).collect();
        self
    }

    /// Render the statement.
    pub fn build(self) -> StmtResult<Statement> {
        if self.columns.is_empty() {
            return Err(StmtError::validation(format!(
                "Insert into {} has no columns",
                self.table.qualified_name()
            )));
        }
        if let Some(OnConflict {
            action: ConflictAction::DoUpdate(changes),
            ..
        }) = &self.on_conflict
        {
            if changes.is_empty() {
                return Err(StmtError::NoChanges);
            }
        }

        let mut stmt = Statement::new();
        for (i, (name, cte)) in self.ctes.iter().enumerate() {
            stmt.write_str(if i == 0 { "WITH " } else { ", " });
            stmt.write_str(name).write_str(" AS (");
            cte.write_body(&mut stmt, &CteContext::new(name, self.table.snapshot()));
            stmt.write_char(')');
        }
        if !self.ctes.is_empty() {
            stmt.write_char(' ');
        }

        stmt.write_str("INSERT INTO ");
        self.table.write_qualified(&mut stmt);
        stmt.write_str(" (");
        write_unqualified_list(&mut stmt, &self.columns);
        stmt.write_str(") VALUES (");
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                stmt.write_str(", ");
            }
            value.write_to(&mut stmt);
        }
        stmt.write_char(')');

        if let Some(on_conflict) = &self.on_conflict {
            stmt.write_str(" ON CONFLICT (");
            write_unqualified_list(&mut stmt, &on_conflict.target);
            stmt.write_char(')');
            match &on_conflict.action {
                ConflictAction::DoNothing => {
                    stmt.write_str(" DO NOTHING");
                }
                ConflictAction::DoUpdate(changes) => {
                    stmt.write_str(" DO UPDATE SET ");
                    changes.write_assignments(&mut stmt, self.table.snapshot());
                }
            }
        }

        if !self.returning.is_empty() {
            stmt.write_str(" RETURNING ").write_str(&self.returning.join(", "));
        }

        Ok(stmt)
    }
}

fn write_unqualified_list(stmt: &mut Statement, columns: &[Column]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            stmt.write_str(", ");
        }
        column.write_unqualified(stmt);
    }
}
