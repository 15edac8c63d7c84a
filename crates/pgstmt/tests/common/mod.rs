//! Shared setup for database-backed tests.
//!
//! Tests connect only when `DATABASE_URL` is set (a `.env` file is honored) and
//! skip otherwise. Each test creates its own schema and drops it afterwards.

#![allow(dead_code)]

use pgstmt::{StmtError, StmtResult};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_postgres::{Client, NoTls};

pub struct TestDb {
    pub client: Client,
    pub schema: String,
}

impl TestDb {
    pub async fn connect(test: &str) -> StmtResult<Option<Self>> {
        dotenvy::dotenv().ok();
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(v) => v,
            Err(_) => {
                eprintln!("DATABASE_URL is not set; skipping {test}");
                return Ok(None);
            }
        };

        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .map_err(StmtError::from_db_error)?;
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before UNIX_EPOCH")
            .as_nanos();
        let schema = format!("pgstmt_{test}_{}_{nanos}", std::process::id());
        client
            .batch_execute(&format!("CREATE SCHEMA {schema}"))
            .await
            .map_err(StmtError::from_db_error)?;

        Ok(Some(Self { client, schema }))
    }

    pub async fn batch(&self, sql: &str) -> StmtResult<()> {
        let sql = sql.replace("{schema}", &self.schema);
        self.client
            .batch_execute(&sql)
            .await
            .map_err(StmtError::from_db_error)
    }

    pub async fn drop(self) -> StmtResult<()> {
        self.client
            .batch_execute(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .await
            .map_err(StmtError::from_db_error)
    }
}

pub const SESSIONS_DDL: &str = r#"
CREATE TABLE {schema}.session_user_agents (
    instance_id TEXT NOT NULL,
    fingerprint_id TEXT NOT NULL,
    description TEXT,
    ip INET,
    headers JSONB,
    PRIMARY KEY (instance_id, fingerprint_id)
);

CREATE TABLE {schema}.sessions (
    instance_id TEXT NOT NULL,
    id TEXT NOT NULL,
    token TEXT,
    lifetime BIGINT,
    expiration TIMESTAMPTZ,
    user_id TEXT,
    creator_id TEXT NOT NULL,
    user_agent_id TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (instance_id, id)
);

CREATE TABLE {schema}.session_factors (
    instance_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    type TEXT NOT NULL,
    last_challenged_at TIMESTAMPTZ,
    challenged_payload JSONB,
    last_verified_at TIMESTAMPTZ,
    verified_payload JSONB,
    failed_attempts INT,
    PRIMARY KEY (instance_id, session_id, type),
    FOREIGN KEY (instance_id, session_id) REFERENCES {schema}.sessions (instance_id, id) ON DELETE CASCADE
);

CREATE TABLE {schema}.session_metadata (
    instance_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value BYTEA,
    PRIMARY KEY (instance_id, session_id, key),
    FOREIGN KEY (instance_id, session_id) REFERENCES {schema}.sessions (instance_id, id) ON DELETE CASCADE
);
"#;

pub const SETTINGS_DDL: &str = r#"
CREATE TABLE {schema}.settings (
    instance_id TEXT NOT NULL,
    id TEXT NOT NULL DEFAULT gen_random_uuid()::TEXT,
    organization_id TEXT,
    type TEXT NOT NULL,
    owner_type TEXT NOT NULL,
    state TEXT NOT NULL,
    payload JSONB NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (instance_id, id),
    UNIQUE NULLS NOT DISTINCT (instance_id, organization_id, type, owner_type, state)
);
"#;
