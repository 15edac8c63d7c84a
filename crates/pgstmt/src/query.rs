//! Query options for reads.
//!
//! [`QueryOpts`] collects everything a `Get`/`List` call appends after the base
//! `SELECT … FROM <table>` text: joins, the condition, grouping, ordering and
//! pagination. Clauses are written in SQL order regardless of the order the
//! options were set in.
//!
//! ```ignore
//! use pgstmt::{Column, Condition, OrderDirection, QueryOpts, TextOp};
//!
//! let opts = QueryOpts::new()
//!     .condition(Condition::text(Column::new("sessions", "instance_id"), TextOp::Equal, "i1"))
//!     .order_by(Column::new("sessions", "created_at"), OrderDirection::Desc)
//!     .limit(20);
//! ```

use crate::column::Column;
use crate::condition::{Condition, write_where};
use crate::statement::{Statement, WriteSql};

/// Sort direction of an `ORDER BY` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    table: String,
    on: Condition,
}

/// Options appended to a base `SELECT`.
#[derive(Debug, Clone, Default)]
pub struct QueryOpts {
    condition: Option<Condition>,
    joins: Vec<Join>,
    group_by: Vec<Column>,
    order_by: Vec<(Column, OrderDirection)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl QueryOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `WHERE` condition, replacing any previous one.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Add `LEFT JOIN <table> ON <on>`.
    pub fn left_join(mut self, table: impl Into<String>, on: Condition) -> Self {
        self.joins.push(Join {
            table: table.into(),
            on,
        });
        self
    }

    /// Append `GROUP BY` columns.
    pub fn group_by(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.group_by.extend(columns);
        self
    }

    /// Append an `ORDER BY` column.
    pub fn order_by(mut self, column: Column, direction: OrderDirection) -> Self {
        self.order_by.push((column, direction));
        self
    }

    /// `LIMIT $n`
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `OFFSET $n`
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The configured condition, if any.
    pub fn get_condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Whether the condition restricts `column`. No condition restricts nothing.
    pub fn is_restricting_column(&self, column: &Column) -> bool {
        self.condition
            .as_ref()
            .is_some_and(|c| c.is_restricting_column(column))
    }
}

fn write_columns(stmt: &mut Statement, columns: &[Column]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            stmt.write_str(", ");
        }
        column.write_qualified(stmt);
    }
}

impl WriteSql for QueryOpts {
    fn write_to(&self, stmt: &mut Statement) {
        for join in &self.joins {
            stmt.write_str(" LEFT JOIN ")
                .write_str(&join.table)
                .write_str(" ON ");
            join.on.write_to(stmt);
        }

        if let Some(condition) = &self.condition {
            write_where(stmt, condition);
        }

        if !self.group_by.is_empty() {
            stmt.write_str(" GROUP BY ");
            write_columns(stmt, &self.group_by);
        }

        if !self.order_by.is_empty() {
            stmt.write_str(" ORDER BY ");
            for (i, (column, direction)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    stmt.write_str(", ");
                }
                column.write_qualified(stmt);
                stmt.write_char(' ').write_str(direction.as_sql());
            }
        }

        if let Some(limit) = self.limit {
            stmt.write_str(" LIMIT ").write_arg(i64::from(limit));
        }
        if let Some(offset) = self.offset {
            stmt.write_str(" OFFSET ").write_arg(i64::from(offset));
        }
    }
}
