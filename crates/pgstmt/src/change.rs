//! Change algebra.
//!
//! A [`Change`] describes one mutation: an assignment rendered into an `UPDATE … SET`
//! list, or an auxiliary statement chained in front of the update as a CTE. Changes
//! are collected into ordered [`Changes`] lists; a list may nest groups, which is how
//! one logical change (e.g. "verify the user factor") expands into a column
//! assignment plus a write to a child table.
//!
//! # Example
//! ```ignore
//! use pgstmt::{Change, Changes, Column, Value};
//!
//! let changes = Changes::from(vec![
//!     Change::set(Column::new("sessions", "token"), "t0k3n"),
//!     Change::set_null(Column::new("sessions", "user_agent_id")),
//!     Change::increment_or(Column::new("sessions", "failed_attempts"), Value::bind(0i32)),
//! ]);
//! ```

use crate::column::Column;
use crate::cte::{CteChange, CteContext, cte_name};
use crate::json::{AttributePatch, JsonChange, PathPatch};
use crate::statement::{Statement, WriteSql};
use crate::table::DEFAULT_SNAPSHOT_NAME;
use crate::value::Value;
use tokio_postgres::types::ToSql;

/// A single mutation.
#[derive(Debug, Clone)]
pub enum Change {
    /// `column = value` (value may be an instruction such as `NOW()` or `NULL`).
    Set { column: Column, value: Value },
    /// `column = COALESCE(column, fallback) + 1`, or `column = column + 1`.
    Increment {
        column: Column,
        fallback: Option<Value>,
    },
    /// An ordered, nested group of changes.
    Group(Changes),
    /// An auxiliary statement chained in front of the update.
    Cte(CteChange),
    /// Patches merged into one JSON column.
    Json(JsonChange),
    /// A JSON patch with a full path but no target column yet.
    PathPatch(PathPatch),
    /// A JSON patch still missing its path prefix.
    Attribute(AttributePatch),
}

impl Change {
    /// `column = $n`
    pub fn set<T>(column: Column, value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        Change::Set {
            column,
            value: Value::bind(value),
        }
    }

    /// `column = <value>`
    pub fn set_value(column: Column, value: Value) -> Self {
        Change::Set { column, value }
    }

    /// `column = NULL`
    pub fn set_null(column: Column) -> Self {
        Self::set_value(column, Value::Null)
    }

    /// `column = NOW()`
    pub fn set_now(column: Column) -> Self {
        Self::set_value(column, Value::Now)
    }

    /// `column = DEFAULT`
    pub fn set_default(column: Column) -> Self {
        Self::set_value(column, Value::Default)
    }

    /// `target = source`, copying the current value of `source` in the same row.
    pub fn set_to_column(target: Column, source: Column) -> Self {
        Self::set_value(target, Value::Column(source))
    }

    /// `column = column + 1`
    pub fn increment(column: Column) -> Self {
        Change::Increment {
            column,
            fallback: None,
        }
    }

    /// `column = COALESCE(column, fallback) + 1`
    pub fn increment_or(column: Column, fallback: Value) -> Self {
        Change::Increment {
            column,
            fallback: Some(fallback),
        }
    }

    /// Group several changes into one.
    pub fn group(changes: impl IntoIterator<Item = Change>) -> Self {
        Change::Group(changes.into_iter().collect())
    }

    /// Whether this change (or a member of this group) assigns `column`.
    pub fn is_on_column(&self, column: &Column) -> bool {
        match self {
            Change::Set { column: c, .. } | Change::Increment { column: c, .. } => c == column,
            Change::Group(group) => group.is_on_column(column),
            Change::Cte(cte) => cte.set_column() == Some(column),
            Change::Json(json) => json.column() == column,
            Change::PathPatch(_) | Change::Attribute(_) => false,
        }
    }

    fn has_assignment(&self) -> bool {
        match self {
            Change::Cte(cte) => cte.set_column().is_some(),
            Change::Group(group) => !group.is_empty(),
            _ => true,
        }
    }

    /// Write the `SET` fragment of this change.
    ///
    /// # Panics
    ///
    /// Panics for [`Change::PathPatch`] and [`Change::Attribute`]: rendering them
    /// without a target column or path prefix would write to the wrong place in the
    /// JSON document.
    fn write_assignment(&self, stmt: &mut Statement, ctx: &CteContext<'_>) {
        match self {
            Change::Set { column, value } => {
                column.write_unqualified(stmt);
                stmt.write_str(" = ");
                value.write_to(stmt);
            }
            Change::Increment { column, fallback } => {
                column.write_unqualified(stmt);
                stmt.write_str(" = ");
                match fallback {
                    Some(fallback) => Value::coalesce(column.clone(), fallback.clone()).write_to(stmt),
                    None => column.write_unqualified(stmt),
                }
                stmt.write_str(" + 1");
            }
            Change::Group(group) => group.write_assignments(stmt, ctx.snapshot),
            Change::Cte(cte) => cte.write_set(stmt, ctx),
            Change::Json(json) => json.write_to(stmt),
            Change::PathPatch(patch) => panic!(
                "json patch on path {:?} written without a target column",
                patch.path()
            ),
            Change::Attribute(patch) => panic!(
                "attribute change on {:?} written without a path prefix",
                patch.suffix()
            ),
        }
    }
}

impl WriteSql for Change {
    fn write_to(&self, stmt: &mut Statement) {
        Changes(vec![self.clone()]).write_to(stmt);
    }
}

impl From<CteChange> for Change {
    fn from(cte: CteChange) -> Self {
        Change::Cte(cte)
    }
}

impl From<JsonChange> for Change {
    fn from(json: JsonChange) -> Self {
        Change::Json(json)
    }
}

impl From<PathPatch> for Change {
    fn from(patch: PathPatch) -> Self {
        Change::PathPatch(patch)
    }
}

impl From<AttributePatch> for Change {
    fn from(patch: AttributePatch) -> Self {
        Change::Attribute(patch)
    }
}

impl From<Changes> for Change {
    fn from(changes: Changes) -> Self {
        Change::Group(changes)
    }
}

/// An ordered list of changes.
#[derive(Debug, Clone, Default)]
pub struct Changes(Vec<Change>);

impl Changes {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    pub fn push(&mut self, change: impl Into<Change>) -> &mut Self {
        self.0.push(change.into());
        self
    }

    /// Number of top-level changes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the top-level changes.
    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.0.iter()
    }

    /// Whether any change assigns `column`.
    pub fn is_on_column(&self, column: &Column) -> bool {
        self.0.iter().any(|c| c.is_on_column(column))
    }

    /// Visit every leaf change with its CTE slot `(i, j)`.
    ///
    /// `i` is the position in this (top-level) list; `j` is the position among the
    /// flattened leaves of a nested group, `0` for top-level leaves.
    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Change, usize, usize)) {
        for (i, change) in self.0.iter().enumerate() {
            match change {
                Change::Group(group) => {
                    let mut j = 0;
                    group.walk_flat(&mut |leaf| {
                        visit(leaf, i, j);
                        j += 1;
                    });
                }
                leaf => visit(leaf, i, 0),
            }
        }
    }

    fn walk_flat<'a>(&'a self, visit: &mut dyn FnMut(&'a Change)) {
        for change in &self.0 {
            match change {
                Change::Group(group) => group.walk_flat(visit),
                leaf => visit(leaf),
            }
        }
    }

    /// CTE changes in chaining order, with their deterministic names.
    pub fn ctes(&self) -> Vec<(String, &CteChange)> {
        let mut out = Vec::new();
        self.walk(&mut |change, i, j| {
            if let Change::Cte(cte) = change {
                out.push((cte_name(i, j), cte));
            }
        });
        out
    }

    /// Write the comma separated `SET` list.
    ///
    /// CTE changes without a `SET` fragment contribute nothing.
    pub fn write_assignments(&self, stmt: &mut Statement, snapshot: &str) {
        let mut first = true;
        self.walk(&mut |change, i, j| {
            if !change.has_assignment() {
                return;
            }
            if !first {
                stmt.write_str(", ");
            }
            first = false;
            let name = cte_name(i, j);
            change.write_assignment(stmt, &CteContext::new(&name, snapshot));
        });
    }
}

impl WriteSql for Changes {
    fn write_to(&self, stmt: &mut Statement) {
        self.write_assignments(stmt, DEFAULT_SNAPSHOT_NAME);
    }
}

impl From<Vec<Change>> for Changes {
    fn from(changes: Vec<Change>) -> Self {
        Changes(changes)
    }
}

impl FromIterator<Change> for Changes {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        Changes(iter.into_iter().collect())
    }
}

impl IntoIterator for Changes {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Changes {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
