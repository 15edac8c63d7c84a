//! Condition algebra.
//!
//! A [`Condition`] is a predicate tree rendered into a SQL boolean expression plus
//! its arguments. Leaves compare a column against a value (text, number, boolean,
//! bytes), against another column, or check for `NULL`; `Exists` filters by a
//! correlated subquery; `And`/`Or`/`Not` combine.
//!
//! # Example
//! ```ignore
//! use pgstmt::{Column, Condition, TextOp};
//!
//! let instance_id = Column::new("sessions", "instance_id");
//! let cond = Condition::and([
//!     Condition::text(instance_id.clone(), TextOp::Equal, "i1"),
//!     Condition::text(Column::new("sessions", "id"), TextOp::Equal, "s1"),
//! ]);
//!
//! assert!(cond.is_restricting_column(&instance_id));
//! ```
//!
//! Conditions always render qualified column names (`table.field`) so they stay
//! unambiguous inside joins, snapshots and correlated subqueries.

use crate::column::{BoolColumn, BytesColumn, Column};
use crate::param::Param;
use crate::statement::{Statement, WriteSql};
use tokio_postgres::types::ToSql;

/// Text comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    /// `col = $n`
    Equal,
    /// `LOWER(col) = LOWER($n)`
    EqualIgnoreCase,
    /// `col <> $n`
    NotEqual,
    /// `LOWER(col) <> LOWER($n)`
    NotEqualIgnoreCase,
    /// `col LIKE $n || '%'`
    StartsWith,
    /// `LOWER(col) LIKE LOWER($n) || '%'`
    StartsWithIgnoreCase,
    /// `col LIKE '%' || $n`
    EndsWith,
    /// `LOWER(col) LIKE '%' || LOWER($n)`
    EndsWithIgnoreCase,
    /// `col LIKE '%' || $n || '%'`
    Contains,
    /// `LOWER(col) LIKE '%' || LOWER($n) || '%'`
    ContainsIgnoreCase,
}

impl TextOp {
    fn ignore_case(self) -> bool {
        matches!(
            self,
            TextOp::EqualIgnoreCase
                | TextOp::NotEqualIgnoreCase
                | TextOp::StartsWithIgnoreCase
                | TextOp::EndsWithIgnoreCase
                | TextOp::ContainsIgnoreCase
        )
    }

    fn operator(self) -> &'static str {
        match self {
            TextOp::Equal | TextOp::EqualIgnoreCase => " = ",
            TextOp::NotEqual | TextOp::NotEqualIgnoreCase => " <> ",
            _ => " LIKE ",
        }
    }

    fn leading_wildcard(self) -> bool {
        matches!(
            self,
            TextOp::EndsWith
                | TextOp::EndsWithIgnoreCase
                | TextOp::Contains
                | TextOp::ContainsIgnoreCase
        )
    }

    fn trailing_wildcard(self) -> bool {
        matches!(
            self,
            TextOp::StartsWith
                | TextOp::StartsWithIgnoreCase
                | TextOp::Contains
                | TextOp::ContainsIgnoreCase
        )
    }
}

/// Number (and timestamp) comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberOp {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    AtMost,
    /// `>`
    GreaterThan,
    /// `>=`
    AtLeast,
}

impl NumberOp {
    fn operator(self) -> &'static str {
        match self {
            NumberOp::Equal => " = ",
            NumberOp::NotEqual => " <> ",
            NumberOp::LessThan => " < ",
            NumberOp::AtMost => " <= ",
            NumberOp::GreaterThan => " > ",
            NumberOp::AtLeast => " >= ",
        }
    }
}

/// Binary comparison operators, evaluated on `sha256` hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesOp {
    Equal,
    NotEqual,
}

/// Column-to-column comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    And,
    Or,
}

/// A predicate tree.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Text comparison against one argument.
    Text {
        column: Column,
        op: TextOp,
        value: Param,
    },
    /// Number or timestamp comparison against one argument.
    Number {
        column: Column,
        op: NumberOp,
        value: Param,
    },
    /// Boolean column used as predicate: `col` or `NOT col`.
    Bool { column: BoolColumn, expected: bool },
    /// Hash-based comparison of a binary column against one argument.
    Bytes {
        column: BytesColumn,
        op: BytesOp,
        value: Param,
    },
    /// Compares two columns, no argument.
    Columns {
        left: Column,
        op: ColumnOp,
        right: Column,
    },
    /// `col IS NULL`
    IsNull(Column),
    /// `col IS NOT NULL`
    IsNotNull(Column),
    /// `EXISTS (SELECT 1 FROM table WHERE condition)`
    Exists {
        table: String,
        condition: Box<Condition>,
    },
    /// All children must hold.
    And(Vec<Condition>),
    /// At least one child must hold.
    Or(Vec<Condition>),
    /// `NOT (condition)`
    Not(Box<Condition>),
}

impl Condition {
    /// Text comparison.
    pub fn text(column: Column, op: TextOp, value: impl Into<String>) -> Self {
        Condition::Text {
            column,
            op,
            value: Param::new(value.into()),
        }
    }

    /// Number or timestamp comparison.
    pub fn number<T>(column: Column, op: NumberOp, value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        Condition::Number {
            column,
            op,
            value: Param::new(value),
        }
    }

    /// Boolean predicate on a boolean column.
    pub fn boolean(column: BoolColumn, expected: bool) -> Self {
        Condition::Bool { column, expected }
    }

    /// Hash-based comparison on a binary column.
    pub fn bytes(column: BytesColumn, op: BytesOp, value: impl Into<Vec<u8>>) -> Self {
        Condition::Bytes {
            column,
            op,
            value: Param::new(value.into()),
        }
    }

    /// `left = right`
    pub fn columns(left: Column, right: Column) -> Self {
        Condition::Columns {
            left,
            op: ColumnOp::Equal,
            right,
        }
    }

    /// `left <op> right`
    pub fn columns_op(left: Column, op: ColumnOp, right: Column) -> Self {
        Condition::Columns { left, op, right }
    }

    /// `col IS NULL`
    pub fn is_null(column: Column) -> Self {
        Condition::IsNull(column)
    }

    /// `col IS NOT NULL`
    pub fn is_not_null(column: Column) -> Self {
        Condition::IsNotNull(column)
    }

    /// Correlated `EXISTS` subquery over `table` (schema-qualified table name).
    pub fn exists(table: impl Into<String>, condition: Condition) -> Self {
        Condition::Exists {
            table: table.into(),
            condition: Box::new(condition),
        }
    }

    /// Conjunction.
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().collect())
    }

    /// Disjunction.
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().collect())
    }

    /// Negation.
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Whether this tree provably pins `column` to a concrete value.
    ///
    /// True when a leaf equates `column` to a value (`= $n`, a boolean predicate or
    /// `IS NULL`) and that leaf is reachable through `And` nodes only. Anything
    /// below `Or`, `Not` or `Exists` does not count.
    pub fn is_restricting_column(&self, column: &Column) -> bool {
        match self {
            Condition::Text {
                column: c,
                op: TextOp::Equal,
                ..
            }
            | Condition::Number {
                column: c,
                op: NumberOp::Equal,
                ..
            }
            | Condition::IsNull(c) => c == column,
            Condition::Bytes {
                column: c,
                op: BytesOp::Equal,
                ..
            } => c.column() == column,
            Condition::Bool { column: c, .. } => c.column() == column,
            Condition::And(children) => children.iter().any(|c| c.is_restricting_column(column)),
            _ => false,
        }
    }

    fn combinator(&self) -> Option<Combinator> {
        match self {
            Condition::And(_) => Some(Combinator::And),
            Condition::Or(_) => Some(Combinator::Or),
            _ => None,
        }
    }

    fn write_group(children: &[Condition], parent: Combinator, stmt: &mut Statement) {
        let (separator, empty) = match parent {
            Combinator::And => (" AND ", "TRUE"),
            Combinator::Or => (" OR ", "FALSE"),
        };
        if children.is_empty() {
            stmt.write_str(empty);
            return;
        }
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                stmt.write_str(separator);
            }
            let parenthesize = child.combinator().is_some_and(|c| c != parent);
            if parenthesize {
                stmt.write_char('(');
            }
            child.write_to(stmt);
            if parenthesize {
                stmt.write_char(')');
            }
        }
    }

    fn write_text(column: &Column, op: TextOp, value: &Param, stmt: &mut Statement) {
        let lower = op.ignore_case();
        if lower && !column.is_lower_shadow() {
            stmt.write_str("LOWER(");
            column.write_qualified(stmt);
            stmt.write_char(')');
        } else {
            column.write_qualified(stmt);
        }
        stmt.write_str(op.operator());
        if op.leading_wildcard() {
            stmt.write_str("'%' || ");
        }
        if lower {
            stmt.write_str("LOWER(");
            stmt.write_param(value.clone());
            stmt.write_char(')');
        } else {
            stmt.write_param(value.clone());
        }
        if op.trailing_wildcard() {
            stmt.write_str(" || '%'");
        }
    }
}

impl WriteSql for Condition {
    fn write_to(&self, stmt: &mut Statement) {
        match self {
            Condition::Text { column, op, value } => Self::write_text(column, *op, value, stmt),
            Condition::Number { column, op, value } => {
                column.write_qualified(stmt);
                stmt.write_str(op.operator());
                stmt.write_param(value.clone());
            }
            Condition::Bool { column, expected } => {
                if !expected {
                    stmt.write_str("NOT ");
                }
                column.column().write_qualified(stmt);
            }
            Condition::Bytes { column, op, value } => {
                if column.is_hashed() {
                    column.column().write_qualified(stmt);
                } else {
                    stmt.write_str("sha256(");
                    column.column().write_qualified(stmt);
                    stmt.write_char(')');
                }
                stmt.write_str(match op {
                    BytesOp::Equal => " = ",
                    BytesOp::NotEqual => " <> ",
                });
                stmt.write_str("sha256(");
                stmt.write_param(value.clone());
                stmt.write_char(')');
            }
            Condition::Columns { left, op, right } => {
                left.write_qualified(stmt);
                stmt.write_str(match op {
                    ColumnOp::Equal => " = ",
                    ColumnOp::NotEqual => " <> ",
                });
                right.write_qualified(stmt);
            }
            Condition::IsNull(column) => {
                column.write_qualified(stmt);
                stmt.write_str(" IS NULL");
            }
            Condition::IsNotNull(column) => {
                column.write_qualified(stmt);
                stmt.write_str(" IS NOT NULL");
            }
            Condition::Exists { table, condition } => {
                stmt.write_str("EXISTS (SELECT 1 FROM ");
                stmt.write_str(table);
                stmt.write_str(" WHERE ");
                condition.write_to(stmt);
                stmt.write_char(')');
            }
            Condition::And(children) => Self::write_group(children, Combinator::And, stmt),
            Condition::Or(children) => Self::write_group(children, Combinator::Or, stmt),
            Condition::Not(inner) => {
                stmt.write_str("NOT (");
                inner.write_to(stmt);
                stmt.write_char(')');
            }
        }
    }
}

/// Write ` WHERE <condition>`.
pub fn write_where(stmt: &mut Statement, condition: &Condition) {
    stmt.write_str(" WHERE ");
    condition.write_to(stmt);
}
