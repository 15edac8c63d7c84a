//! Statement builder.
//!
//! [`Statement`] is an append-only SQL text buffer plus an ordered argument list.
//! Placeholders are allocated as arguments are appended, so `$n` always refers to
//! the n-th appended argument:
//!
//! ```ignore
//! use pgstmt::Statement;
//!
//! let mut stmt = Statement::with_sql("SELECT * FROM zitadel.sessions WHERE instance_id = ");
//! stmt.write_arg("i1").write_str(" AND id = ").write_arg("s1");
//!
//! assert_eq!(stmt.sql(), "SELECT * FROM zitadel.sessions WHERE instance_id = $1 AND id = $2");
//! ```
//!
//! No SQL validation happens here; every other component writes into a
//! `Statement` and is responsible for emitting valid text.

use crate::param::Param;
use std::fmt;
use tokio_postgres::types::ToSql;

/// Anything that renders itself into a [`Statement`].
///
/// Conditions, changes, values and query options all implement this; rendering
/// appends text and arguments in walk order and cannot fail.
pub trait WriteSql {
    /// Append this fragment's text and arguments.
    fn write_to(&self, stmt: &mut Statement);
}

/// A SQL text buffer with positional arguments.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    text: String,
    args: Vec<Param>,
}

impl Statement {
    /// Create an empty statement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a statement with initial SQL text.
    pub fn with_sql(initial_sql: impl Into<String>) -> Self {
        Self {
            text: initial_sql.into(),
            args: Vec::new(),
        }
    }

    /// Create a statement from SQL that already contains `$1..$n` placeholders
    /// together with their arguments.
    pub fn with_args(sql: impl Into<String>, args: impl IntoIterator<Item = Param>) -> Self {
        Self {
            text: sql.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Append literal SQL text.
    pub fn write_str(&mut self, sql: &str) -> &mut Self {
        self.text.push_str(sql);
        self
    }

    /// Append a single character.
    pub fn write_char(&mut self, c: char) -> &mut Self {
        self.text.push(c);
        self
    }

    /// Render a fragment into this statement.
    pub fn write<W: WriteSql + ?Sized>(&mut self, fragment: &W) -> &mut Self {
        fragment.write_to(self);
        self
    }

    /// Append an argument and return its placeholder (`$n`) without writing it.
    pub fn append_arg<T>(&mut self, value: T) -> String
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.append_param(Param::new(value))
    }

    /// Append a pre-wrapped argument and return its placeholder.
    pub fn append_param(&mut self, param: Param) -> String {
        self.args.push(param);
        format!("${}", self.args.len())
    }

    /// Append several arguments, preserving order, and return their placeholders.
    pub fn append_args<T>(&mut self, values: impl IntoIterator<Item = T>) -> Vec<String>
    where
        T: ToSql + Send + Sync + 'static,
    {
        values.into_iter().map(|v| self.append_arg(v)).collect()
    }

    /// Append an argument and write its placeholder.
    pub fn write_arg<T>(&mut self, value: T) -> &mut Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.write_param(Param::new(value))
    }

    /// Append a pre-wrapped argument and write its placeholder.
    pub fn write_param(&mut self, param: Param) -> &mut Self {
        let placeholder = self.append_param(param);
        self.text.push_str(&placeholder);
        self
    }

    /// Append arguments and write their placeholders comma separated.
    ///
    /// If `values` is empty this writes `NULL`, so `IN (NULL)` stays valid SQL.
    pub fn write_args<T>(&mut self, values: impl IntoIterator<Item = T>) -> &mut Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.write_params(values.into_iter().map(Param::new))
    }

    /// Like [`Statement::write_args`] for pre-wrapped (possibly heterogeneous) arguments.
    pub fn write_params(&mut self, params: impl IntoIterator<Item = Param>) -> &mut Self {
        let mut iter = params.into_iter();
        let Some(first) = iter.next() else {
            return self.write_str("NULL");
        };

        self.write_param(first);
        for param in iter {
            self.write_str(", ");
            self.write_param(param);
        }
        self
    }

    /// The accumulated SQL text.
    pub fn sql(&self) -> &str {
        &self.text
    }

    /// The accumulated arguments, in placeholder order.
    pub fn args(&self) -> &[Param] {
        &self.args
    }

    /// Argument refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.args.iter().map(Param::as_ref).collect()
    }

    /// Whether no text has been written yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Split into SQL text and arguments.
    pub fn into_parts(self) -> (String, Vec<Param>) {
        (self.text, self.args)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
