//! Column model.
//!
//! A [`Column`] identifies a table + field pair. It renders either qualified
//! (`table.field`) for joined or ambiguous contexts, or unqualified (`field`) for
//! single-table `UPDATE`/`INSERT` targets.
//!
//! Typed wrappers narrow what a column may be used for: [`BoolColumn`] is the only
//! column accepted by boolean conditions, [`BytesColumn`] is the only column accepted
//! by hash-based binary conditions.

use crate::statement::Statement;
use std::fmt;
use std::sync::Arc;

/// Suffix of precomputed lower-cased shadow columns.
const LOWER_SHADOW_SUFFIX: &str = "_lower";

/// A table + field pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    table: Arc<str>,
    name: Arc<str>,
}

impl Column {
    /// Create a column reference.
    pub fn new(table: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// The (unqualified) table name or alias this column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a precomputed lower-cased shadow column (e.g. `username_lower`).
    pub fn is_lower_shadow(&self) -> bool {
        self.name.ends_with(LOWER_SHADOW_SUFFIX)
    }

    /// The same field on another table or alias (e.g. a CTE snapshot).
    pub fn on_table(&self, table: impl Into<Arc<str>>) -> Self {
        Self {
            table: table.into(),
            name: self.name.clone(),
        }
    }

    /// Write `table.field`.
    pub fn write_qualified(&self, stmt: &mut Statement) {
        stmt.write_str(&self.table);
        stmt.write_char('.');
        stmt.write_str(&self.name);
    }

    /// Write `field`.
    pub fn write_unqualified(&self, stmt: &mut Statement) {
        stmt.write_str(&self.name);
    }

    /// Mark this column as boolean-typed.
    pub fn boolean(self) -> BoolColumn {
        BoolColumn(self)
    }

    /// Mark this column as a binary column compared through its hash.
    pub fn bytes(self) -> BytesColumn {
        BytesColumn {
            column: self,
            hashed: false,
        }
    }

    /// Mark this column as already holding the hash of the binary value.
    pub fn hashed_bytes(self) -> BytesColumn {
        BytesColumn {
            column: self,
            hashed: true,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// A boolean-typed column.
///
/// Boolean conditions render the bare column as a predicate, which is only valid SQL
/// for boolean columns; requiring this wrapper keeps other columns out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoolColumn(Column);

impl BoolColumn {
    /// The underlying column.
    pub fn column(&self) -> &Column {
        &self.0
    }
}

impl From<BoolColumn> for Column {
    fn from(value: BoolColumn) -> Self {
        value.0
    }
}

/// A binary column compared through `sha256`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BytesColumn {
    column: Column,
    hashed: bool,
}

impl BytesColumn {
    /// The underlying column.
    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Whether the column stores the hash instead of the raw value.
    pub fn is_hashed(&self) -> bool {
        self.hashed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_qualified_and_unqualified() {
        let col = Column::new("sessions", "token");
        let mut stmt = Statement::new();
        col.write_qualified(&mut stmt);
        stmt.write_str(" / ");
        col.write_unqualified(&mut stmt);
        assert_eq!(stmt.sql(), "sessions.token / token");
    }

    #[test]
    fn equality_needs_table_and_name() {
        let a = Column::new("users", "id");
        assert_eq!(a, Column::new("users", "id"));
        assert_ne!(a, Column::new("sessions", "id"));
        assert_ne!(a, Column::new("users", "instance_id"));
    }

    #[test]
    fn detects_lower_shadow_columns() {
        assert!(Column::new("users", "username_lower").is_lower_shadow());
        assert!(!Column::new("users", "username").is_lower_shadow());
    }

    #[test]
    fn on_table_keeps_field() {
        let col = Column::new("sessions", "id").on_table("existing_row");
        assert_eq!(col.to_string(), "existing_row.id");
    }
}
