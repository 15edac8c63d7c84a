//! Values and instructions.
//!
//! A [`Value`] is either a bound argument or a symbolic instruction that is
//! resolved to SQL at render time. Instructions let call sites say "use the
//! column default" or "use the database clock" without binding anything.

use crate::column::Column;
use crate::param::Param;
use crate::statement::{Statement, WriteSql};
use tokio_postgres::types::ToSql;

/// The right-hand side of an assignment or an insert slot.
#[derive(Debug, Clone)]
pub enum Value {
    /// A bound argument, rendered as `$n`.
    Bind(Param),
    /// The database clock: `NOW()`.
    Now,
    /// The column default: `DEFAULT`.
    Default,
    /// `NULL`.
    Null,
    /// The current value of another column of the same row (unqualified).
    Column(Column),
    /// `COALESCE(column, fallback)`.
    Coalesce(Column, Box<Value>),
    /// The value proposed for insertion in an `ON CONFLICT … DO UPDATE`: `EXCLUDED.column`.
    Excluded(Column),
}

impl Value {
    /// Bind a value as an argument.
    pub fn bind<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Value::Bind(Param::new(value))
    }

    /// Bind `Some(value)`, or `NULL` for `None`.
    pub fn bind_opt<T: ToSql + Send + Sync + 'static>(value: Option<T>) -> Self {
        value.map_or(Value::Null, Value::bind)
    }

    /// Bind `Some(value)`, or `DEFAULT` for `None`.
    pub fn bind_or_default<T: ToSql + Send + Sync + 'static>(value: Option<T>) -> Self {
        value.map_or(Value::Default, Value::bind)
    }

    /// `COALESCE(column, fallback)`.
    pub fn coalesce(column: Column, fallback: Value) -> Self {
        Value::Coalesce(column, Box::new(fallback))
    }

    /// Whether rendering this value appends an argument.
    pub fn binds(&self) -> bool {
        match self {
            Value::Bind(_) => true,
            Value::Coalesce(_, fallback) => fallback.binds(),
            Value::Now | Value::Default | Value::Null | Value::Column(_) | Value::Excluded(_) => {
                false
            }
        }
    }
}

impl From<Param> for Value {
    fn from(param: Param) -> Self {
        Value::Bind(param)
    }
}

impl WriteSql for Value {
    fn write_to(&self, stmt: &mut Statement) {
        match self {
            Value::Bind(param) => {
                stmt.write_param(param.clone());
            }
            Value::Now => {
                stmt.write_str("NOW()");
            }
            Value::Default => {
                stmt.write_str("DEFAULT");
            }
            Value::Null => {
                stmt.write_str("NULL");
            }
            Value::Column(column) => column.write_unqualified(stmt),
            Value::Coalesce(column, fallback) => {
                stmt.write_str("COALESCE(");
                column.write_unqualified(stmt);
                stmt.write_str(", ");
                fallback.write_to(stmt);
                stmt.write_char(')');
            }
            Value::Excluded(column) => {
                stmt.write_str("EXCLUDED.");
                column.write_unqualified(stmt);
            }
        }
    }
}
