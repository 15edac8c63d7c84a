//! Async execution of built statements.
//!
//! Every execution emits a `tracing` event under target `pgstmt.sql` before the
//! statement is sent (tag, argument count, truncated SQL) and one after it
//! completes (elapsed time). Nothing is retried.

use crate::client::GenericClient;
use crate::error::StmtResult;
use crate::row::FromRow;
use crate::statement::Statement;
use std::time::Instant;

/// Default truncation for logged SQL, in bytes.
pub const DEFAULT_MAX_LOGGED_SQL_LENGTH: usize = 200;

/// Execution options.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Operation tag attached to log events (e.g. `"sessions.update"`).
    pub tag: Option<String>,
    /// Truncate logged SQL (in bytes). `None` logs the full text.
    pub max_logged_sql_length: Option<usize>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            tag: None,
            max_logged_sql_length: Some(DEFAULT_MAX_LOGGED_SQL_LENGTH),
        }
    }
}

impl ExecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an operation tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set maximum SQL length to log.
    pub fn max_logged_sql_length(mut self, len: usize) -> Self {
        self.max_logged_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_logged_sql_length = None;
        self
    }

    fn logged_sql(&self, sql: &str) -> String {
        match self.max_logged_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    fn before(&self, stmt: &Statement) -> Instant {
        tracing::debug!(
            target: "pgstmt.sql",
            tag = self.tag.as_deref().unwrap_or("-"),
            param_count = stmt.args().len(),
            sql = %self.logged_sql(stmt.sql()),
            "executing statement"
        );
        Instant::now()
    }

    fn after(&self, start: Instant, rows: usize) {
        tracing::debug!(
            target: "pgstmt.sql",
            tag = self.tag.as_deref().unwrap_or("-"),
            rows,
            elapsed_us = start.elapsed().as_micros() as u64,
            "statement completed"
        );
    }
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

impl Statement {
    /// Execute and return the number of affected rows.
    pub async fn execute(&self, client: &impl GenericClient) -> StmtResult<u64> {
        self.execute_with(client, &ExecConfig::default()).await
    }

    pub async fn execute_with(
        &self,
        client: &impl GenericClient,
        config: &ExecConfig,
    ) -> StmtResult<u64> {
        let start = config.before(self);
        let affected = client.execute(self.sql(), &self.params_ref()).await?;
        config.after(start, affected as usize);
        Ok(affected)
    }

    /// Execute and decode every returned row.
    pub async fn fetch_all<T: FromRow>(&self, client: &impl GenericClient) -> StmtResult<Vec<T>> {
        self.fetch_all_with(client, &ExecConfig::default()).await
    }

    pub async fn fetch_all_with<T: FromRow>(
        &self,
        client: &impl GenericClient,
        config: &ExecConfig,
    ) -> StmtResult<Vec<T>> {
        let start = config.before(self);
        let rows = client.query(self.sql(), &self.params_ref()).await?;
        config.after(start, rows.len());
        rows.iter().map(T::from_row).collect()
    }

    /// Execute and decode the first row, if any.
    pub async fn fetch_opt<T: FromRow>(&self, client: &impl GenericClient) -> StmtResult<Option<T>> {
        self.fetch_opt_with(client, &ExecConfig::default()).await
    }

    pub async fn fetch_opt_with<T: FromRow>(
        &self,
        client: &impl GenericClient,
        config: &ExecConfig,
    ) -> StmtResult<Option<T>> {
        let start = config.before(self);
        let row = client.query_opt(self.sql(), &self.params_ref()).await?;
        config.after(start, usize::from(row.is_some()));
        row.as_ref().map(T::from_row).transpose()
    }

    /// Execute and decode the first row.
    ///
    /// Returns [`crate::StmtError::NotFound`] if no row was returned.
    pub async fn fetch_one<T: FromRow>(&self, client: &impl GenericClient) -> StmtResult<T> {
        self.fetch_one_with(client, &ExecConfig::default()).await
    }

    pub async fn fetch_one_with<T: FromRow>(
        &self,
        client: &impl GenericClient,
        config: &ExecConfig,
    ) -> StmtResult<T> {
        let start = config.before(self);
        let row = client.query_one(self.sql(), &self.params_ref()).await?;
        config.after(start, 1);
        T::from_row(&row)
    }
}
