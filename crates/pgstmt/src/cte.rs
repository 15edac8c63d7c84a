//! CTE (WITH clause) chaining for updates.
//!
//! A [`CteChange`] contributes an auxiliary statement (an upsert into a child table,
//! a delete of stale rows, …) that runs in the same round trip as the update of the
//! parent row. Every chained CTE can read the `existing_row` snapshot of the parent,
//! which is taken before any of them runs.
//!
//! Names are assigned while the final statement is written: the CTE at top-level
//! position `i`, flattened position `j` inside a nested group, is called
//! `cte_<i>_<j>`. The callbacks receive their name through [`CteContext`], so a
//! `SET` fragment can reference the rows its CTE returned.
//!
//! # Example
//! ```ignore
//! use pgstmt::{Change, CteChange, Column};
//!
//! let cte = CteChange::new(|stmt, ctx| {
//!     stmt.write_str("INSERT INTO zitadel.session_user_agents (instance_id, fingerprint_id) SELECT instance_id, ")
//!         .write_arg("fp-1")
//!         .write_str(" FROM ")
//!         .write_str(ctx.snapshot)
//!         .write_str(" RETURNING fingerprint_id");
//! })
//! .with_set(Column::new("sessions", "user_agent_id"), |stmt, ctx| {
//!     stmt.write_str("(SELECT fingerprint_id FROM ").write_str(ctx.name).write_char(')');
//! });
//! ```

use crate::column::Column;
use crate::condition::{Condition, write_where};
use crate::statement::Statement;
use crate::table::TableConfig;
use std::fmt;
use std::sync::Arc;

/// Deterministic CTE name for slot `(i, j)`.
pub fn cte_name(i: usize, j: usize) -> String {
    format!("cte_{i}_{j}")
}

/// What a CTE callback knows about its position in the chain.
#[derive(Debug, Clone, Copy)]
pub struct CteContext<'a> {
    /// The name assigned to this CTE (`cte_<i>_<j>`).
    pub name: &'a str,
    /// The name of the pre-update snapshot of the parent row.
    pub snapshot: &'a str,
}

impl<'a> CteContext<'a> {
    pub fn new(name: &'a str, snapshot: &'a str) -> Self {
        Self { name, snapshot }
    }
}

type CteWriter = Arc<dyn Fn(&mut Statement, &CteContext<'_>) + Send + Sync>;

/// A change that runs as an auxiliary statement chained in front of the update.
#[derive(Clone)]
pub struct CteChange {
    body: CteWriter,
    set: Option<(Column, CteWriter)>,
}

impl CteChange {
    /// Create a CTE change from a callback writing the auxiliary statement body
    /// (without the `name AS (` wrapper).
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut Statement, &CteContext<'_>) + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
            set: None,
        }
    }

    /// Also assign `column` in the parent update; the callback writes the
    /// right-hand side and may reference the CTE by name.
    pub fn with_set<F>(mut self, column: Column, value: F) -> Self
    where
        F: Fn(&mut Statement, &CteContext<'_>) + Send + Sync + 'static,
    {
        self.set = Some((column, Arc::new(value)));
        self
    }

    /// The parent column assigned by this change, if any.
    pub fn set_column(&self) -> Option<&Column> {
        self.set.as_ref().map(|(column, _)| column)
    }

    /// Write the auxiliary statement body.
    pub fn write_body(&self, stmt: &mut Statement, ctx: &CteContext<'_>) {
        (self.body)(stmt, ctx);
    }

    /// Write `column = <value>` if this change assigns a parent column.
    pub(crate) fn write_set(&self, stmt: &mut Statement, ctx: &CteContext<'_>) {
        if let Some((column, value)) = &self.set {
            column.write_unqualified(stmt);
            stmt.write_str(" = ");
            value(stmt, ctx);
        }
    }
}

impl fmt::Debug for CteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CteChange")
            .field("set", &self.set_column())
            .finish_non_exhaustive()
    }
}

/// Write `WITH <snapshot> AS (SELECT * FROM <table> WHERE <condition>), <name> AS (...), ...`.
///
/// The snapshot is always first so every chained CTE observes the row as it was
/// before the update.
pub(crate) fn write_chain(
    stmt: &mut Statement,
    table: &TableConfig,
    condition: &Condition,
    ctes: &[(String, &CteChange)],
) {
    let snapshot = table.snapshot();
    stmt.write_str("WITH ")
        .write_str(snapshot)
        .write_str(" AS (SELECT * FROM ");
    table.write_qualified(stmt);
    write_where(stmt, condition);
    stmt.write_char(')');

    for (name, cte) in ctes {
        stmt.write_str(", ").write_str(name).write_str(" AS (");
        cte.write_body(stmt, &CteContext::new(name, snapshot));
        stmt.write_char(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::TextOp;

    #[test]
    fn names_are_positional() {
        assert_eq!(cte_name(0, 0), "cte_0_0");
        assert_eq!(cte_name(3, 2), "cte_3_2");
    }

    #[test]
    fn chain_starts_with_snapshot() {
        let table = TableConfig::new("zitadel", "sessions").unwrap();
        let cond = Condition::text(table.column("id"), TextOp::Equal, "s1");
        let delete = CteChange::new(|stmt, ctx| {
            stmt.write_str("DELETE FROM zitadel.session_metadata USING ")
                .write_str(ctx.snapshot)
                .write_str(" WHERE session_metadata.session_id = ")
                .write_str(ctx.snapshot)
                .write_str(".id");
        });

        let mut stmt = Statement::new();
        write_chain(&mut stmt, &table, &cond, &[(cte_name(1, 0), &delete)]);
        assert_eq!(
            stmt.sql(),
            "WITH existing_row AS (SELECT * FROM zitadel.sessions WHERE sessions.id = $1), \
             cte_1_0 AS (DELETE FROM zitadel.session_metadata USING existing_row \
             WHERE session_metadata.session_id = existing_row.id)"
        );
    }

    #[test]
    fn set_fragment_sees_own_name() {
        let cte = CteChange::new(|_, _| {}).with_set(Column::new("sessions", "user_agent_id"), |stmt, ctx| {
            stmt.write_str("(SELECT fingerprint_id FROM ")
                .write_str(ctx.name)
                .write_char(')');
        });
        let mut stmt = Statement::new();
        cte.write_set(&mut stmt, &CteContext::new("cte_2_0", "existing_row"));
        assert_eq!(stmt.sql(), "user_agent_id = (SELECT fingerprint_id FROM cte_2_0)");
        assert_eq!(cte.set_column(), Some(&Column::new("sessions", "user_agent_id")));
    }
}
