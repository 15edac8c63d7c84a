//! `UPDATE` statements, optionally with chained CTEs.
//!
//! Without CTE changes the result is a plain
//! `UPDATE <schema.table> SET <changes> WHERE <condition>`.
//!
//! With CTE changes the parent row is snapshotted first and every auxiliary
//! statement runs in the same round trip:
//!
//! ```text
//! WITH existing_row AS (SELECT * FROM zitadel.sessions WHERE <condition>)
//!    , cte_0_0 AS (INSERT INTO zitadel.session_factors … FROM existing_row …)
//!    , cte_1_0 AS (DELETE FROM zitadel.session_metadata …)
//! UPDATE zitadel.sessions SET token = $n, updated_at = NOW()
//! WHERE (sessions.instance_id, sessions.id) IN (SELECT instance_id, id FROM existing_row)
//! ```
//!
//! The final `UPDATE` only references the snapshot, so it targets the same rows the
//! auxiliary statements saw.

use crate::change::{Change, Changes};
use crate::condition::{Condition, write_where};
use crate::cte::write_chain;
use crate::error::{StmtError, StmtResult};
use crate::statement::Statement;
use crate::table::TableConfig;

/// Builder for one `UPDATE` statement.
#[derive(Debug, Clone)]
pub struct Update<'a> {
    table: &'a TableConfig,
    condition: &'a Condition,
    changes: Changes,
}

impl<'a> Update<'a> {
    pub fn new(table: &'a TableConfig, condition: &'a Condition, changes: impl Into<Changes>) -> Self {
        Self {
            table,
            condition,
            changes: changes.into(),
        }
    }

    /// Render the statement.
    ///
    /// Fails with [`StmtError::NoChanges`] for an empty change list and with
    /// [`StmtError::Validation`] when CTE changes are present on a table without a
    /// primary key. Nothing is rendered on failure.
    pub fn build(self) -> StmtResult<Statement> {
        if self.changes.is_empty() {
            return Err(StmtError::NoChanges);
        }

        let table = self.table;
        let mut changes = self.changes;
        if let Some(updated_at) = table.updated_at() {
            if !changes.is_on_column(&updated_at) {
                changes.push(Change::set_now(updated_at));
            }
        }

        let ctes = changes.ctes();
        let mut stmt = Statement::new();

        if ctes.is_empty() {
            stmt.write_str("UPDATE ");
            table.write_qualified(&mut stmt);
            stmt.write_str(" SET ");
            changes.write_assignments(&mut stmt, table.snapshot());
            write_where(&mut stmt, self.condition);
            return Ok(stmt);
        }

        let primary_key = table.primary_key_columns();
        if primary_key.is_empty() {
            return Err(StmtError::validation(format!(
                "Chained update on {} requires a primary key",
                table.qualified_name()
            )));
        }

        write_chain(&mut stmt, table, self.condition, &ctes);
        stmt.write_str(" UPDATE ");
        table.write_qualified(&mut stmt);
        stmt.write_str(" SET ");
        changes.write_assignments(&mut stmt, table.snapshot());

        stmt.write_str(" WHERE (");
        for (i, column) in primary_key.iter().enumerate() {
            if i > 0 {
                stmt.write_str(", ");
            }
            column.write_qualified(&mut stmt);
        }
        stmt.write_str(") IN (SELECT ");
        for (i, column) in primary_key.iter().enumerate() {
            if i > 0 {
                stmt.write_str(", ");
            }
            column.write_unqualified(&mut stmt);
        }
        stmt.write_str(" FROM ").write_str(table.snapshot()).write_char(')');

        Ok(stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::TextOp;
    use crate::cte::CteChange;

    fn sessions() -> TableConfig {
        TableConfig::new("zitadel", "sessions")
            .unwrap()
            .tenant_column("instance_id")
            .unwrap()
            .primary_key(["instance_id", "id"])
            .unwrap()
    }

    fn pk(table: &TableConfig) -> Condition {
        Condition::and([
            Condition::text(table.column("instance_id"), TextOp::Equal, "i1"),
            Condition::text(table.column("id"), TextOp::Equal, "s1"),
        ])
    }

    fn factor_upsert(kind: &'static str) -> Change {
        Change::Cte(CteChange::new(move |stmt, ctx| {
            stmt.write_str("INSERT INTO zitadel.session_factors (instance_id, session_id, type) SELECT instance_id, id, ")
                .write_arg(kind)
                .write_str(" FROM ")
                .write_str(ctx.snapshot);
        }))
    }

    #[test]
    fn plain_update_appends_audit_column() {
        let table = sessions();
        let cond = pk(&table);
        let stmt = Update::new(&table, &cond, vec![Change::set(table.column("token"), "t")])
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE zitadel.sessions SET token = $1, updated_at = NOW() \
             WHERE sessions.instance_id = $2 AND sessions.id = $3"
        );
        assert_eq!(format!("{:?}", stmt.args()), r#"["t", "i1", "s1"]"#);
    }

    #[test]
    fn explicit_audit_value_is_kept() {
        let table = sessions();
        let cond = pk(&table);
        let stmt = Update::new(
            &table,
            &cond,
            vec![Change::set_null(table.column("updated_at"))],
        )
        .build()
        .unwrap();
        assert_eq!(
            stmt.sql(),
            "UPDATE zitadel.sessions SET updated_at = NULL WHERE sessions.instance_id = $1 AND sessions.id = $2"
        );
    }

    #[test]
    fn audit_column_can_be_disabled() {
        let table = sessions().without_updated_at();
        let cond = pk(&table);
        let stmt = Update::new(&table, &cond, vec![Change::set(table.column("token"), "t")])
            .build()
            .unwrap();
        assert!(!stmt.sql().contains("updated_at"));
    }

    #[test]
    fn no_changes_fails_before_rendering() {
        let table = sessions();
        let cond = pk(&table);
        let err = Update::new(&table, &cond, Changes::new()).build().unwrap_err();
        assert!(err.is_no_changes());
    }

    #[test]
    fn two_ctes_chain_after_snapshot() {
        let table = sessions();
        let cond = pk(&table);
        let stmt = Update::new(
            &table,
            &cond,
            vec![factor_upsert("user"), factor_upsert("password")],
        )
        .build()
        .unwrap();

        assert_eq!(
            stmt.sql(),
            "WITH existing_row AS (SELECT * FROM zitadel.sessions WHERE sessions.instance_id = $1 AND sessions.id = $2), \
             cte_0_0 AS (INSERT INTO zitadel.session_factors (instance_id, session_id, type) SELECT instance_id, id, $3 FROM existing_row), \
             cte_1_0 AS (INSERT INTO zitadel.session_factors (instance_id, session_id, type) SELECT instance_id, id, $4 FROM existing_row) \
             UPDATE zitadel.sessions SET updated_at = NOW() \
             WHERE (sessions.instance_id, sessions.id) IN (SELECT instance_id, id FROM existing_row)"
        );
        assert_eq!(
            format!("{:?}", stmt.args()),
            r#"["i1", "s1", "user", "password"]"#
        );
    }

    #[test]
    fn grouped_cte_uses_group_position() {
        let table = sessions();
        let cond = pk(&table);
        let stmt = Update::new(
            &table,
            &cond,
            vec![
                Change::set(table.column("token"), "t"),
                Change::group([Change::set(table.column("user_id"), "u1"), factor_upsert("user")]),
            ],
        )
        .build()
        .unwrap();

        assert!(stmt.sql().contains(", cte_1_1 AS (INSERT INTO zitadel.session_factors"));
        assert!(stmt.sql().contains(" UPDATE zitadel.sessions SET token = $4, user_id = $5, updated_at = NOW()"));
    }

    #[test]
    fn snapshot_name_is_configurable() {
        let table = sessions().snapshot_name("existing_session").unwrap();
        let cond = pk(&table);
        let stmt = Update::new(&table, &cond, vec![factor_upsert("totp")])
            .build()
            .unwrap();
        assert!(stmt.sql().starts_with("WITH existing_session AS (SELECT * FROM zitadel.sessions"));
        assert!(stmt.sql().ends_with("FROM existing_session)"));
    }

    #[test]
    fn chained_update_requires_primary_key() {
        let table = TableConfig::new("zitadel", "sessions").unwrap();
        let cond = Condition::text(table.column("id"), TextOp::Equal, "s1");
        let err = Update::new(&table, &cond, vec![factor_upsert("user")])
            .build()
            .unwrap_err();
        assert!(matches!(err, StmtError::Validation(_)));
    }
}
