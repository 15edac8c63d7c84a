//! Sessions repository.
//!
//! A session row owns three child tables: factors, metadata and a shared
//! user-agent record. Every child write is expressed as a [`CteChange`], so a
//! single `update` call touches the session and its children in one statement.
//!
//! Lifetimes are stored as whole seconds (`BIGINT`).

use crate::change::{Change, Changes};
use crate::column::Column;
use crate::condition::{Condition, NumberOp, TextOp, write_where};
use crate::cte::CteChange;
use crate::error::{StmtError, StmtResult};
use crate::insert::Insert;
use crate::param::Param;
use crate::query::QueryOpts;
use crate::repository::Guard;
use crate::row::{FromRow, RowExt};
use crate::statement::Statement;
use crate::table::TableConfig;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use tokio_postgres::Row;

/// Kind of authentication factor attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    User,
    Password,
    IdentityProviderIntent,
    Passkey,
    Totp,
    OtpSms,
    OtpEmail,
}

impl FactorType {
    pub fn as_str(self) -> &'static str {
        match self {
            FactorType::User => "user",
            FactorType::Password => "password",
            FactorType::IdentityProviderIntent => "identity_provider_intent",
            FactorType::Passkey => "passkey",
            FactorType::Totp => "totp",
            FactorType::OtpSms => "otp_sms",
            FactorType::OtpEmail => "otp_email",
        }
    }
}

/// A verified factor.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFactor {
    User {
        user_id: String,
        last_verified_at: DateTime<Utc>,
    },
    Password {
        last_verified_at: DateTime<Utc>,
    },
    IdentityProviderIntent {
        last_verified_at: DateTime<Utc>,
    },
    Passkey {
        last_verified_at: DateTime<Utc>,
        user_verified: bool,
    },
    Totp {
        last_verified_at: DateTime<Utc>,
    },
    OtpSms {
        last_verified_at: DateTime<Utc>,
    },
    OtpEmail {
        last_verified_at: DateTime<Utc>,
    },
}

/// A pending challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChallenge {
    /// Only [`FactorType::Passkey`], [`FactorType::OtpSms`] and
    /// [`FactorType::OtpEmail`] are challenged.
    pub factor_type: FactorType,
    pub last_challenged_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// A factor as stored in `session_factors`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFactor {
    #[serde(rename = "type")]
    pub factor_type: FactorType,
    pub last_challenged_at: Option<DateTime<Utc>>,
    pub challenged_payload: Option<serde_json::Value>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub verified_payload: Option<serde_json::Value>,
    pub failed_attempts: Option<i32>,
}

/// One metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub key: String,
    pub value: Vec<u8>,
}

/// The user agent a session was created from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUserAgent {
    pub fingerprint_id: String,
    pub description: Option<String>,
    pub ip: Option<IpAddr>,
    pub headers: Option<serde_json::Value>,
}

/// A session row with its aggregated children.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub instance_id: String,
    pub id: String,
    pub token: Option<String>,
    pub lifetime: Option<Duration>,
    pub expiration: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub creator_id: String,
    pub user_agent_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub factors: Vec<StoredFactor>,
    pub metadata: Vec<SessionMetadata>,
}

impl FromRow for Session {
    fn from_row(row: &Row) -> StmtResult<Self> {
        let factors: Option<serde_json::Value> = row.try_get_column("factors")?;
        let keys: Vec<String> = row.try_get_column("metadata_keys")?;
        let values: Vec<Vec<u8>> = row.try_get_column("metadata_values")?;
        if keys.len() != values.len() {
            return Err(StmtError::decode(
                "metadata_values",
                format!("{} keys but {} values", keys.len(), values.len()),
            ));
        }

        Ok(Self {
            instance_id: row.try_get_column("instance_id")?,
            id: row.try_get_column("id")?,
            token: row.try_get_column("token")?,
            lifetime: row
                .try_get_column::<Option<i64>>("lifetime")?
                .map(|secs| Duration::from_secs(secs.max(0) as u64)),
            expiration: row.try_get_column("expiration")?,
            user_id: row.try_get_column("user_id")?,
            creator_id: row.try_get_column("creator_id")?,
            user_agent_id: row.try_get_column("user_agent_id")?,
            created_at: row.try_get_column("created_at")?,
            updated_at: row.try_get_column("updated_at")?,
            factors: match factors {
                Some(value) => serde_json::from_value(value)?,
                None => Vec::new(),
            },
            metadata: keys
                .into_iter()
                .zip(values)
                .map(|(key, value)| SessionMetadata { key, value })
                .collect(),
        })
    }
}

// (column, SQL type) pairs written by the factor upserts.
const VERIFIED: &[(&str, &str)] = &[("last_verified_at", "TIMESTAMPTZ")];
const VERIFIED_WITH_PAYLOAD: &[(&str, &str)] =
    &[("last_verified_at", "TIMESTAMPTZ"), ("verified_payload", "JSONB")];
const CHALLENGED: &[(&str, &str)] =
    &[("last_challenged_at", "TIMESTAMPTZ"), ("challenged_payload", "JSONB")];

/// Sessions and their child tables.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    guard: Guard,
    factors: TableConfig,
    metadata: TableConfig,
    user_agents: TableConfig,
}

impl SessionRepository {
    /// Repository over `<schema>.sessions`, `<schema>.session_factors`,
    /// `<schema>.session_metadata` and `<schema>.session_user_agents`.
    pub fn new(schema: &str) -> StmtResult<Self> {
        let sessions = TableConfig::new(schema, "sessions")?
            .tenant_column("instance_id")?
            .primary_key(["instance_id", "id"])?;
        let factors = TableConfig::new(schema, "session_factors")?
            .tenant_column("instance_id")?
            .primary_key(["instance_id", "session_id", "type"])?;
        let metadata = TableConfig::new(schema, "session_metadata")?
            .tenant_column("instance_id")?
            .primary_key(["instance_id", "session_id", "key"])?;
        let user_agents = TableConfig::new(schema, "session_user_agents")?
            .tenant_column("instance_id")?
            .primary_key(["instance_id", "fingerprint_id"])?;
        Ok(Self::with_tables(sessions, factors, metadata, user_agents))
    }

    pub fn with_tables(
        sessions: TableConfig,
        factors: TableConfig,
        metadata: TableConfig,
        user_agents: TableConfig,
    ) -> Self {
        Self {
            guard: Guard::new(sessions),
            factors,
            metadata,
            user_agents,
        }
    }

    pub fn table(&self) -> &TableConfig {
        self.guard.table()
    }

    // ---- columns ----

    pub fn instance_id_column(&self) -> Column {
        self.table().column("instance_id")
    }

    pub fn id_column(&self) -> Column {
        self.table().column("id")
    }

    pub fn token_column(&self) -> Column {
        self.table().column("token")
    }

    pub fn lifetime_column(&self) -> Column {
        self.table().column("lifetime")
    }

    pub fn expiration_column(&self) -> Column {
        self.table().column("expiration")
    }

    pub fn user_id_column(&self) -> Column {
        self.table().column("user_id")
    }

    pub fn creator_id_column(&self) -> Column {
        self.table().column("creator_id")
    }

    pub fn user_agent_id_column(&self) -> Column {
        self.table().column("user_agent_id")
    }

    pub fn created_at_column(&self) -> Column {
        self.table().column("created_at")
    }

    pub fn updated_at_column(&self) -> Column {
        self.table().column("updated_at")
    }

    pub fn factor_type_column(&self) -> Column {
        self.factors.column("type")
    }

    pub fn factor_last_verified_at_column(&self) -> Column {
        self.factors.column("last_verified_at")
    }

    pub fn metadata_key_column(&self) -> Column {
        self.metadata.column("key")
    }

    // ---- conditions ----

    pub fn primary_key_condition(&self, instance_id: &str, id: &str) -> Condition {
        Condition::and([self.instance_id_condition(instance_id), self.id_condition(id)])
    }

    pub fn instance_id_condition(&self, instance_id: &str) -> Condition {
        Condition::text(self.instance_id_column(), TextOp::Equal, instance_id)
    }

    pub fn id_condition(&self, id: &str) -> Condition {
        Condition::text(self.id_column(), TextOp::Equal, id)
    }

    pub fn user_id_condition(&self, user_id: &str) -> Condition {
        Condition::text(self.user_id_column(), TextOp::Equal, user_id)
    }

    pub fn creator_id_condition(&self, creator_id: &str) -> Condition {
        Condition::text(self.creator_id_column(), TextOp::Equal, creator_id)
    }

    pub fn user_agent_id_condition(&self, user_agent_id: &str) -> Condition {
        Condition::text(self.user_agent_id_column(), TextOp::Equal, user_agent_id)
    }

    pub fn created_at_condition(&self, op: NumberOp, created_at: DateTime<Utc>) -> Condition {
        Condition::number(self.created_at_column(), op, created_at)
    }

    pub fn updated_at_condition(&self, op: NumberOp, updated_at: DateTime<Utc>) -> Condition {
        Condition::number(self.updated_at_column(), op, updated_at)
    }

    pub fn factor_type_condition(&self, factor_type: FactorType) -> Condition {
        Condition::text(self.factor_type_column(), TextOp::Equal, factor_type.as_str())
    }

    pub fn metadata_key_condition(&self, op: TextOp, key: &str) -> Condition {
        Condition::text(self.metadata_key_column(), op, key)
    }

    /// Sessions having a factor matching `condition`.
    pub fn exists_factor(&self, condition: Condition) -> Condition {
        Condition::exists(
            self.factors.qualified_name(),
            Condition::and([
                Condition::columns(self.instance_id_column(), self.factors.column("instance_id")),
                Condition::columns(self.id_column(), self.factors.column("session_id")),
                condition,
            ]),
        )
    }

    /// Sessions having a metadata entry matching `condition`.
    pub fn exists_metadata(&self, condition: Condition) -> Condition {
        Condition::exists(
            self.metadata.qualified_name(),
            Condition::and([
                Condition::columns(self.instance_id_column(), self.metadata.column("instance_id")),
                Condition::columns(self.id_column(), self.metadata.column("session_id")),
                condition,
            ]),
        )
    }

    // ---- changes ----

    pub fn set_token(&self, token: impl Into<String>) -> Change {
        Change::set(self.token_column(), token.into())
    }

    /// Fails for lifetimes that do not fit into `BIGINT` seconds.
    pub fn set_lifetime(&self, lifetime: Duration) -> StmtResult<Change> {
        let secs = i64::try_from(lifetime.as_secs()).map_err(|_| {
            StmtError::validation(format!("Session lifetime of {}s is out of range", lifetime.as_secs()))
        })?;
        Ok(Change::set(self.lifetime_column(), secs))
    }

    pub fn set_expiration(&self, expiration: DateTime<Utc>) -> Change {
        Change::set(self.expiration_column(), expiration)
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) -> Change {
        Change::set(self.user_id_column(), user_id.into())
    }

    pub fn set_updated_at(&self, updated_at: DateTime<Utc>) -> Change {
        Change::set(self.updated_at_column(), updated_at)
    }

    /// Upsert a verified factor. The user factor also sets `user_id`.
    pub fn set_factor(&self, factor: SessionFactor) -> Change {
        let verified = |factor_type: FactorType, at: DateTime<Utc>| {
            Change::Cte(self.upsert_factor(factor_type, VERIFIED, vec![Param::new(at)]))
        };
        match factor {
            SessionFactor::User {
                user_id,
                last_verified_at,
            } => Change::group([
                self.set_user_id(user_id),
                verified(FactorType::User, last_verified_at),
            ]),
            SessionFactor::Password { last_verified_at } => {
                verified(FactorType::Password, last_verified_at)
            }
            SessionFactor::IdentityProviderIntent { last_verified_at } => {
                verified(FactorType::IdentityProviderIntent, last_verified_at)
            }
            SessionFactor::Passkey {
                last_verified_at,
                user_verified,
            } => Change::Cte(self.upsert_factor(
                FactorType::Passkey,
                VERIFIED_WITH_PAYLOAD,
                vec![
                    Param::new(last_verified_at),
                    Param::new(serde_json::json!({ "userVerified": user_verified })),
                ],
            )),
            SessionFactor::Totp { last_verified_at } => verified(FactorType::Totp, last_verified_at),
            SessionFactor::OtpSms { last_verified_at } => {
                verified(FactorType::OtpSms, last_verified_at)
            }
            SessionFactor::OtpEmail { last_verified_at } => {
                verified(FactorType::OtpEmail, last_verified_at)
            }
        }
    }

    /// Upsert a pending challenge.
    pub fn set_challenge(&self, challenge: SessionChallenge) -> StmtResult<Change> {
        match challenge.factor_type {
            FactorType::Passkey | FactorType::OtpSms | FactorType::OtpEmail => {}
            other => {
                return Err(StmtError::validation(format!(
                    "Factor '{}' cannot be challenged",
                    other.as_str()
                )));
            }
        }
        Ok(Change::Cte(self.upsert_factor(
            challenge.factor_type,
            CHALLENGED,
            vec![
                Param::new(challenge.last_challenged_at),
                Param::new(challenge.payload),
            ],
        )))
    }

    fn upsert_factor(
        &self,
        factor_type: FactorType,
        columns: &'static [(&'static str, &'static str)],
        values: Vec<Param>,
    ) -> CteChange {
        let table = self.factors.qualified_name();
        CteChange::new(move |stmt, ctx| {
            stmt.write_str("INSERT INTO ")
                .write_str(&table)
                .write_str(" (instance_id, session_id, type");
            for (column, _) in columns {
                stmt.write_str(", ").write_str(column);
            }
            stmt.write_str(") SELECT instance_id, id, ")
                .write_arg(factor_type.as_str())
                .write_str("::TEXT");
            for ((_, sql_type), value) in columns.iter().zip(&values) {
                stmt.write_str(", ")
                    .write_param(value.clone())
                    .write_str("::")
                    .write_str(sql_type);
            }
            stmt.write_str(" FROM ")
                .write_str(ctx.snapshot)
                .write_str(" ON CONFLICT (instance_id, session_id, type) DO UPDATE SET ");
            for (i, (column, _)) in columns.iter().enumerate() {
                if i > 0 {
                    stmt.write_str(", ");
                }
                stmt.write_str(column)
                    .write_str(" = EXCLUDED.")
                    .write_str(column);
            }
        })
    }

    /// The `AND`-joined link between a child table and the snapshot row.
    fn child_of_snapshot(child: &TableConfig, snapshot: &str) -> Condition {
        Condition::and([
            Condition::columns(child.column("instance_id"), Column::new(snapshot, "instance_id")),
            Condition::columns(child.column("session_id"), Column::new(snapshot, "id")),
        ])
    }

    /// Remove a factor.
    pub fn clear_factor(&self, factor_type: FactorType) -> Change {
        let factors = self.factors.clone();
        Change::Cte(CteChange::new(move |stmt, ctx| {
            stmt.write_str("DELETE FROM ");
            factors.write_qualified(stmt);
            stmt.write_str(" USING ").write_str(ctx.snapshot);
            write_where(
                stmt,
                &Condition::and([
                    Self::child_of_snapshot(&factors, ctx.snapshot),
                    Condition::text(factors.column("type"), TextOp::Equal, factor_type.as_str()),
                ]),
            );
        }))
    }

    /// Count a failed check of a factor.
    pub fn increment_failed_attempts(&self, factor_type: FactorType) -> Change {
        let factors = self.factors.clone();
        Change::Cte(CteChange::new(move |stmt, ctx| {
            stmt.write_str("UPDATE ");
            factors.write_qualified(stmt);
            stmt.write_str(" SET ");
            stmt.write(&Change::increment_or(
                factors.column("failed_attempts"),
                Value::bind(0i32),
            ));
            stmt.write_str(" FROM ").write_str(ctx.snapshot);
            write_where(
                stmt,
                &Condition::and([
                    Self::child_of_snapshot(&factors, ctx.snapshot),
                    Condition::text(factors.column("type"), TextOp::Equal, factor_type.as_str()),
                ]),
            );
        }))
    }

    /// Replace the session's metadata: upsert every entry, delete every other key.
    pub fn set_metadata(&self, metadata: Vec<SessionMetadata>) -> Change {
        let table = self.metadata.qualified_name();
        let keys: Vec<String> = metadata.iter().map(|m| m.key.clone()).collect();

        let mut changes: Changes = metadata
            .into_iter()
            .map(|entry| {
                let table = table.clone();
                Change::Cte(CteChange::new(move |stmt, ctx| {
                    stmt.write_str("INSERT INTO ")
                        .write_str(&table)
                        .write_str(" (instance_id, session_id, key, value) SELECT instance_id, id, ")
                        .write_arg(entry.key.clone())
                        .write_str("::TEXT, ")
                        .write_arg(entry.value.clone())
                        .write_str("::BYTEA FROM ")
                        .write_str(ctx.snapshot)
                        .write_str(" ON CONFLICT (instance_id, session_id, key) DO UPDATE SET value = EXCLUDED.value");
                }))
            })
            .collect();

        let metadata_table = self.metadata.clone();
        changes.push(CteChange::new(move |stmt, ctx| {
            stmt.write_str("DELETE FROM ");
            metadata_table.write_qualified(stmt);
            stmt.write_str(" USING ").write_str(ctx.snapshot);
            write_where(stmt, &Self::child_of_snapshot(&metadata_table, ctx.snapshot));
            if !keys.is_empty() {
                stmt.write_str(" AND ");
                metadata_table.column("key").write_qualified(stmt);
                stmt.write_str(" NOT IN (").write_args(keys.clone()).write_char(')');
            }
        }));

        Change::Group(changes)
    }

    /// Upsert the user agent and point the session at it.
    pub fn set_user_agent(&self, user_agent: SessionUserAgent) -> Change {
        let table = self.user_agents.qualified_name();
        let cte = CteChange::new(move |stmt, ctx| {
            stmt.write_str("INSERT INTO ")
                .write_str(&table)
                .write_str(" (instance_id, fingerprint_id, description, ip, headers) SELECT instance_id, ")
                .write_arg(user_agent.fingerprint_id.clone())
                .write_str("::TEXT, ")
                .write_arg(user_agent.description.clone())
                .write_str("::TEXT, ")
                .write_arg(user_agent.ip)
                .write_str("::INET, ")
                .write_arg(user_agent.headers.clone())
                .write_str("::JSONB FROM ")
                .write_str(ctx.snapshot)
                .write_str(
                    " ON CONFLICT (instance_id, fingerprint_id) DO UPDATE SET \
                     description = EXCLUDED.description, ip = EXCLUDED.ip, headers = EXCLUDED.headers \
                     RETURNING fingerprint_id",
                );
        })
        .with_set(self.user_agent_id_column(), |stmt, ctx| {
            stmt.write_str("(SELECT fingerprint_id FROM ")
                .write_str(ctx.name)
                .write_char(')');
        });
        Change::Cte(cte)
    }

    // ---- statements ----

    /// Insert a new session. When a user agent is given it is upserted in the
    /// same statement and referenced by its fingerprint.
    pub fn create(
        &self,
        session: &Session,
        user_agent: Option<&SessionUserAgent>,
    ) -> StmtResult<Statement> {
        let mut insert = Insert::new(self.table());

        let mut user_agent_id = Value::bind_opt(session.user_agent_id.clone());
        if let Some(user_agent) = user_agent {
            let user_agent = user_agent.clone();
            let user_agents = self.user_agents.qualified_name();
            let instance_id = session.instance_id.clone();
            user_agent_id = Value::bind(user_agent.fingerprint_id.clone());
            insert = insert.with(
                "user_agent",
                CteChange::new(move |stmt, _| {
                    stmt.write_str("INSERT INTO ")
                        .write_str(&user_agents)
                        .write_str(" (instance_id, fingerprint_id, description, ip, headers) VALUES (")
                        .write_arg(instance_id.clone())
                        .write_str(", ")
                        .write_arg(user_agent.fingerprint_id.clone())
                        .write_str(", ")
                        .write_arg(user_agent.description.clone())
                        .write_str(", ")
                        .write_arg(user_agent.ip)
                        .write_str(", ")
                        .write_arg(user_agent.headers.clone())
                        .write_str(
                            ") ON CONFLICT (instance_id, fingerprint_id) DO UPDATE SET \
                             description = EXCLUDED.description, ip = EXCLUDED.ip, headers = EXCLUDED.headers",
                        );
                }),
            );
        }

        insert
            .value(self.instance_id_column(), Value::bind(session.instance_id.clone()))
            .value(self.id_column(), Value::bind(session.id.clone()))
            .value(self.creator_id_column(), Value::bind(session.creator_id.clone()))
            .value(self.user_agent_id_column(), user_agent_id)
            .value(self.created_at_column(), Value::bind_or_default(session.created_at))
            .value(self.updated_at_column(), Value::bind_or_default(session.updated_at))
            .returning(["created_at", "updated_at"])
            .build()
    }

    fn select_base(&self) -> String {
        let t = self.table().name();
        let f = self.factors.name();
        let m = self.metadata.name();
        let mq = self.metadata.qualified_name();
        let children = format!("{m}.instance_id = {t}.instance_id AND {m}.session_id = {t}.id");
        format!(
            "SELECT {t}.instance_id, {t}.id, {t}.token, {t}.lifetime, {t}.expiration, {t}.user_id, \
             {t}.creator_id, {t}.user_agent_id, {t}.created_at, {t}.updated_at, \
             jsonb_agg(DISTINCT jsonb_build_object('type', {f}.type, 'lastChallengedAt', {f}.last_challenged_at, \
             'challengedPayload', {f}.challenged_payload, 'lastVerifiedAt', {f}.last_verified_at, \
             'verifiedPayload', {f}.verified_payload, 'failedAttempts', {f}.failed_attempts)) \
             FILTER (WHERE {f}.session_id IS NOT NULL) AS factors, \
             ARRAY(SELECT {m}.key FROM {mq} WHERE {children} ORDER BY {m}.key) AS metadata_keys, \
             ARRAY(SELECT {m}.value FROM {mq} WHERE {children} ORDER BY {m}.key) AS metadata_values \
             FROM {}",
            self.table().qualified_name()
        )
    }

    fn with_children(&self, opts: QueryOpts) -> QueryOpts {
        opts.left_join(
            self.factors.qualified_name(),
            Condition::and([
                Condition::columns(self.instance_id_column(), self.factors.column("instance_id")),
                Condition::columns(self.id_column(), self.factors.column("session_id")),
            ]),
        )
        .group_by([self.instance_id_column(), self.id_column()])
    }

    /// Read one session (first match) with factors and metadata.
    pub fn get(&self, opts: QueryOpts) -> StmtResult<Statement> {
        self.guard
            .select(&self.select_base(), &self.with_children(opts.limit(1)))
    }

    /// Read sessions with factors and metadata.
    pub fn list(&self, opts: QueryOpts) -> StmtResult<Statement> {
        self.guard.select(&self.select_base(), &self.with_children(opts))
    }

    pub fn update(&self, condition: &Condition, changes: impl Into<Changes>) -> StmtResult<Statement> {
        self.guard.update(condition, changes)
    }

    pub fn delete(&self, condition: &Condition) -> StmtResult<Statement> {
        self.guard.delete(condition)
    }
}

#[cfg(test)]
mod tests;
