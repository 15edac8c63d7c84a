//! Convenient imports for typical `pgstmt` usage.
//!
//! ```ignore
//! use pgstmt::prelude::*;
//! ```

pub use crate::{
    Change, Changes, Column, Condition, ExecConfig, FromRow, GenericClient, Guard, Insert,
    NumberOp, OrderDirection, QueryOpts, RowExt, Statement, StmtError, StmtResult, TableConfig,
    TextOp, Value, WriteSql,
};
