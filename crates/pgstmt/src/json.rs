//! JSON attribute patches.
//!
//! Settings-like entities keep their payload in one `JSONB` column. A setter only
//! knows the *suffix* of the attribute it changes (`["length"]`), while the caller
//! knows where that attribute lives (`["clientSecret"]`). Patches therefore come in
//! three stages:
//!
//! 1. [`AttributePatch`]: suffix only. Writing it panics.
//! 2. [`PathPatch`]: full path, produced by [`AttributePatch::bind`] or
//!    [`bind_attributes`]. Still has no target column, so writing it panics too.
//! 3. [`JsonChange`]: all path patches of one column, produced by
//!    [`merge_json_patches`]. Renders one nested `jsonb_set` expression:
//!
//! ```text
//! payload = jsonb_set(jsonb_set(COALESCE(payload, '{}'::JSONB), $1::TEXT[], $2::JSONB, TRUE), $3::TEXT[], $4::JSONB, TRUE)
//! ```
//!
//! Patches are applied in list order, so a later patch on the same path wins.
//! Parent objects of a path are not created implicitly.

use crate::change::{Change, Changes};
use crate::column::Column;
use crate::error::StmtResult;
use crate::statement::{Statement, WriteSql};
use serde::Serialize;

/// What a patch does at its path.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Set the value at the path.
    Set(serde_json::Value),
    /// Remove the key at the path.
    Remove,
}

fn to_path(segments: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    segments.into_iter().map(Into::into).collect()
}

/// A JSON patch with a complete path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPatch {
    path: Vec<String>,
    op: PatchOp,
}

impl PathPatch {
    /// Set `path` to `value`.
    pub fn set_value(path: impl IntoIterator<Item = impl Into<String>>, value: serde_json::Value) -> Self {
        Self {
            path: to_path(path),
            op: PatchOp::Set(value),
        }
    }

    /// Set `path` to the JSON serialization of `value`.
    pub fn set<T: Serialize>(path: impl IntoIterator<Item = impl Into<String>>, value: &T) -> StmtResult<Self> {
        Ok(Self::set_value(path, serde_json::to_value(value)?))
    }

    /// Remove the key at `path`.
    pub fn remove(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            path: to_path(path),
            op: PatchOp::Remove,
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn op(&self) -> &PatchOp {
        &self.op
    }

    fn apply(self, source: JsonExpr) -> JsonExpr {
        let source = Box::new(source);
        match self.op {
            PatchOp::Set(value) => JsonExpr::Set {
                source,
                path: self.path,
                value,
            },
            PatchOp::Remove => JsonExpr::Remove {
                source,
                path: self.path,
            },
        }
    }
}

/// A JSON patch that only knows the suffix of its path.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePatch {
    suffix: Vec<String>,
    op: PatchOp,
}

impl AttributePatch {
    /// Set the attribute at `suffix` to `value`.
    pub fn set(suffix: impl IntoIterator<Item = impl Into<String>>, value: serde_json::Value) -> Self {
        Self {
            suffix: to_path(suffix),
            op: PatchOp::Set(value),
        }
    }

    /// Set the attribute at `suffix` to the JSON serialization of `value`.
    pub fn set_serialized<T: Serialize>(
        suffix: impl IntoIterator<Item = impl Into<String>>,
        value: &T,
    ) -> StmtResult<Self> {
        Ok(Self::set(suffix, serde_json::to_value(value)?))
    }

    /// Remove the attribute at `suffix`.
    pub fn remove(suffix: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            suffix: to_path(suffix),
            op: PatchOp::Remove,
        }
    }

    pub fn suffix(&self) -> &[String] {
        &self.suffix
    }

    /// Prepend `prefix`, producing a patch with the full path.
    pub fn bind(&self, prefix: &[&str]) -> PathPatch {
        let path = prefix
            .iter()
            .map(|s| (*s).to_string())
            .chain(self.suffix.iter().cloned())
            .collect();
        PathPatch {
            path,
            op: self.op.clone(),
        }
    }
}

/// Bind every attribute patch in `changes` (including nested groups) to `prefix`.
///
/// Other changes are returned unchanged.
pub fn bind_attributes(prefix: &[&str], changes: Changes) -> Changes {
    changes
        .into_iter()
        .map(|change| match change {
            Change::Attribute(patch) => Change::PathPatch(patch.bind(prefix)),
            Change::Group(group) => Change::Group(bind_attributes(prefix, group)),
            other => other,
        })
        .collect()
}

/// The folded JSON expression: the column, wrapped once per patch.
#[derive(Debug, Clone)]
enum JsonExpr {
    Column(Column),
    Set {
        source: Box<JsonExpr>,
        path: Vec<String>,
        value: serde_json::Value,
    },
    Remove {
        source: Box<JsonExpr>,
        path: Vec<String>,
    },
}

impl WriteSql for JsonExpr {
    fn write_to(&self, stmt: &mut Statement) {
        match self {
            JsonExpr::Column(column) => {
                stmt.write_str("COALESCE(");
                column.write_unqualified(stmt);
                stmt.write_str(", '{}'::JSONB)");
            }
            JsonExpr::Set {
                source,
                path,
                value,
            } => {
                stmt.write_str("jsonb_set(");
                source.write_to(stmt);
                stmt.write_str(", ")
                    .write_arg(path.clone())
                    .write_str("::TEXT[], ")
                    .write_arg(value.clone())
                    .write_str("::JSONB, TRUE)");
            }
            JsonExpr::Remove { source, path } => {
                stmt.write_char('(');
                source.write_to(stmt);
                stmt.write_str(" #- ").write_arg(path.clone()).write_str("::TEXT[])");
            }
        }
    }
}

/// All patches targeting one JSON column.
#[derive(Debug, Clone)]
pub struct JsonChange {
    column: Column,
    patches: Vec<PathPatch>,
}

impl JsonChange {
    pub fn new(column: Column, patches: impl IntoIterator<Item = PathPatch>) -> Self {
        Self {
            column,
            patches: patches.into_iter().collect(),
        }
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn patches(&self) -> &[PathPatch] {
        &self.patches
    }

    fn expression(&self) -> JsonExpr {
        self.patches
            .iter()
            .cloned()
            .fold(JsonExpr::Column(self.column.clone()), |source, patch| patch.apply(source))
    }
}

impl WriteSql for JsonChange {
    fn write_to(&self, stmt: &mut Statement) {
        self.column.write_unqualified(stmt);
        stmt.write_str(" = ");
        self.expression().write_to(stmt);
    }
}

/// Merge every [`PathPatch`] in `changes` (and any existing [`JsonChange`] on
/// `column`) into a single [`JsonChange`] on `column`.
///
/// The merged change takes the position of the first patch; all other changes keep
/// their relative order. Groups emptied by the merge are dropped.
pub fn merge_json_patches(column: &Column, changes: Changes) -> Changes {
    let mut patches = Vec::new();
    let mut position = None;
    let mut merged = Vec::with_capacity(changes.len());

    for change in changes {
        let kept = extract_patches(change, column, &mut patches);
        if position.is_none() && !patches.is_empty() {
            position = Some(merged.len());
        }
        if let Some(change) = kept {
            merged.push(change);
        }
    }

    if let Some(position) = position {
        merged.insert(position, Change::Json(JsonChange::new(column.clone(), patches)));
    }
    Changes::from(merged)
}

fn extract_patches(change: Change, column: &Column, patches: &mut Vec<PathPatch>) -> Option<Change> {
    match change {
        Change::PathPatch(patch) => {
            patches.push(patch);
            None
        }
        Change::Json(json) if json.column() == column => {
            patches.extend(json.patches);
            None
        }
        Change::Group(group) => {
            let rest: Changes = group
                .into_iter()
                .filter_map(|c| extract_patches(c, column, patches))
                .collect();
            (!rest.is_empty()).then(|| Change::Group(rest))
        }
        other => Some(other),
    }
}
