//! # pgstmt
//!
//! Typed SQL statement construction for PostgreSQL repositories.
//!
//! ## Features
//!
//! - **Placeholders only**: every value is bound as `$n`, never interpolated
//! - **Condition algebra**: `And`/`Or`/`Not`/`Exists` trees that know which columns they restrict
//! - **Safe defaults**: updates and deletes refuse to run without a tenant restriction
//! - **Change chaining**: child-table writes run as CTEs in the same statement as the parent update
//! - **JSON patches**: attribute updates on a `JSONB` column fold into one nested `jsonb_set`
//! - **Query logging**: executed statements are logged through `tracing`
//!
//! ## Example
//!
//! ```ignore
//! use pgstmt::prelude::*;
//! use pgstmt::repository::session::{SessionFactor, SessionRepository};
//!
//! let sessions = SessionRepository::new("zitadel")?;
//! let stmt = sessions.update(
//!     &sessions.primary_key_condition("i1", "s1"),
//!     vec![
//!         sessions.set_token("token"),
//!         sessions.set_factor(SessionFactor::Password { last_verified_at: now }),
//!     ],
//! )?;
//! let updated = stmt.execute(&client).await?;
//! ```

pub mod change;
pub mod client;
pub mod column;
pub mod condition;
pub mod cte;
pub mod error;
pub mod exec;
pub mod insert;
pub mod json;
pub mod param;
pub mod prelude;
pub mod query;
pub mod repository;
pub mod row;
pub mod statement;
pub mod table;
pub mod update;
pub mod value;

pub use change::{Change, Changes};
pub use client::GenericClient;
pub use column::{BoolColumn, BytesColumn, Column};
pub use condition::{BytesOp, ColumnOp, Condition, NumberOp, TextOp, write_where};
pub use cte::{CteChange, CteContext, cte_name};
pub use error::{StmtError, StmtResult};
pub use exec::{DEFAULT_MAX_LOGGED_SQL_LENGTH, ExecConfig};
pub use insert::{ConflictAction, Insert};
pub use json::{AttributePatch, JsonChange, PatchOp, PathPatch, bind_attributes, merge_json_patches};
pub use param::Param;
pub use query::{OrderDirection, QueryOpts};
pub use repository::Guard;
pub use row::{FromRow, RowExt};
pub use statement::{Statement, WriteSql};
pub use table::{DEFAULT_SNAPSHOT_NAME, DEFAULT_UPDATED_AT, TableConfig, validate_ident};
pub use update::Update;
pub use value::Value;
