//! Session repository against a live database.
//!
//! Requires `DATABASE_URL`; skipped otherwise.

mod common;

use chrono::{TimeZone, Utc};
use common::{SESSIONS_DDL, TestDb};
use pgstmt::prelude::*;
use pgstmt::repository::session::{
    FactorType, Session, SessionChallenge, SessionFactor, SessionMetadata, SessionRepository,
    SessionUserAgent,
};
use std::time::Duration;

fn new_session(id: &str) -> Session {
    Session {
        instance_id: "i1".to_string(),
        id: id.to_string(),
        token: None,
        lifetime: None,
        expiration: None,
        user_id: None,
        creator_id: "creator".to_string(),
        user_agent_id: None,
        created_at: None,
        updated_at: None,
        factors: Vec::new(),
        metadata: Vec::new(),
    }
}

#[tokio::test]
async fn session_lifecycle() -> StmtResult<()> {
    let Some(db) = TestDb::connect("session_lifecycle").await? else {
        return Ok(());
    };
    db.batch(SESSIONS_DDL).await?;
    let repo = SessionRepository::new(&db.schema)?;
    let client = &db.client;

    let user_agent = SessionUserAgent {
        fingerprint_id: "fp1".to_string(),
        description: Some("firefox".to_string()),
        ip: Some("127.0.0.1".parse().expect("valid ip")),
        headers: Some(serde_json::json!({ "accept-language": ["en"] })),
    };
    let created = repo
        .create(&new_session("s1"), Some(&user_agent))?
        .execute_with(client, &ExecConfig::new().tag("sessions.create"))
        .await?;
    assert_eq!(created, 1);

    let pk = repo.primary_key_condition("i1", "s1");
    let get = || repo.get(QueryOpts::new().condition(pk.clone()));

    let session: Session = get()?.fetch_one(client).await?;
    assert_eq!(session.creator_id, "creator");
    assert_eq!(session.user_agent_id.as_deref(), Some("fp1"));
    assert!(session.factors.is_empty());
    assert!(session.metadata.is_empty());

    let verified_at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let updated = repo
        .update(
            &pk,
            vec![
                repo.set_token("token-1"),
                repo.set_lifetime(Duration::from_secs(3600))?,
                repo.set_factor(SessionFactor::User {
                    user_id: "u1".to_string(),
                    last_verified_at: verified_at,
                }),
                repo.set_factor(SessionFactor::Password {
                    last_verified_at: verified_at,
                }),
                repo.set_metadata(vec![
                    SessionMetadata {
                        key: "k1".to_string(),
                        value: b"v1".to_vec(),
                    },
                    SessionMetadata {
                        key: "k2".to_string(),
                        value: vec![0, 255],
                    },
                ]),
            ],
        )?
        .execute(client)
        .await?;
    assert_eq!(updated, 1);

    let session: Session = get()?.fetch_one(client).await?;
    assert_eq!(session.token.as_deref(), Some("token-1"));
    assert_eq!(session.lifetime, Some(Duration::from_secs(3600)));
    assert_eq!(session.user_id.as_deref(), Some("u1"));
    let mut types: Vec<_> = session.factors.iter().map(|f| f.factor_type).collect();
    types.sort_by_key(|t| t.as_str());
    assert_eq!(types, [FactorType::Password, FactorType::User]);
    assert!(
        session
            .factors
            .iter()
            .all(|f| f.last_verified_at == Some(verified_at))
    );
    let mut metadata = session.metadata.clone();
    metadata.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(metadata[0].value, b"v1");
    assert_eq!(metadata[1].value, vec![0, 255]);

    // Replacing metadata drops keys that are not listed.
    repo.update(
        &pk,
        vec![
            repo.clear_factor(FactorType::Password),
            repo.increment_failed_attempts(FactorType::User),
            repo.set_metadata(vec![SessionMetadata {
                key: "k2".to_string(),
                value: b"new".to_vec(),
            }]),
        ],
    )?
    .execute(client)
    .await?;

    let session: Session = get()?.fetch_one(client).await?;
    assert_eq!(session.factors.len(), 1);
    assert_eq!(session.factors[0].factor_type, FactorType::User);
    assert_eq!(session.factors[0].failed_attempts, Some(1));
    assert_eq!(
        session.metadata,
        [SessionMetadata {
            key: "k2".to_string(),
            value: b"new".to_vec(),
        }]
    );

    let deleted = repo.delete(&pk)?.execute(client).await?;
    assert_eq!(deleted, 1);
    assert!(get()?.fetch_opt::<Session>(client).await?.is_none());

    db.drop().await
}

#[tokio::test]
async fn sessions_are_filtered_through_children() -> StmtResult<()> {
    let Some(db) = TestDb::connect("session_children").await? else {
        return Ok(());
    };
    db.batch(SESSIONS_DDL).await?;
    let repo = SessionRepository::new(&db.schema)?;
    let client = &db.client;

    for id in ["s1", "s2"] {
        repo.create(&new_session(id), None)?.execute(client).await?;
    }

    let challenged_at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
    repo.update(
        &repo.primary_key_condition("i1", "s2"),
        vec![
            repo.set_challenge(SessionChallenge {
                factor_type: FactorType::OtpEmail,
                last_challenged_at: challenged_at,
                payload: serde_json::json!({ "code": "encrypted" }),
            })?,
            repo.set_user_agent(SessionUserAgent {
                fingerprint_id: "fp2".to_string(),
                description: None,
                ip: None,
                headers: None,
            }),
        ],
    )?
    .execute(client)
    .await?;

    let sessions: Vec<Session> = repo
        .list(
            QueryOpts::new().condition(Condition::and([
                repo.instance_id_condition("i1"),
                repo.exists_factor(repo.factor_type_condition(FactorType::OtpEmail)),
            ])),
        )?
        .fetch_all(client)
        .await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "s2");
    assert_eq!(sessions[0].user_agent_id.as_deref(), Some("fp2"));
    assert_eq!(sessions[0].factors[0].last_challenged_at, Some(challenged_at));

    let all: Vec<Session> = repo
        .list(
            QueryOpts::new()
                .condition(repo.instance_id_condition("i1"))
                .order_by(repo.id_column(), OrderDirection::Desc),
        )?
        .fetch_all(client)
        .await?;
    let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["s2", "s1"]);

    let err = repo
        .create(&new_session("s1"), None)?
        .execute(client)
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    db.drop().await
}
