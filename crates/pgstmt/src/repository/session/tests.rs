use super::*;
use chrono::TimeZone;

fn repo() -> SessionRepository {
    SessionRepository::new("zitadel").unwrap()
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
}

fn update(changes: Vec<Change>) -> Statement {
    let repo = repo();
    repo.update(&repo.primary_key_condition("i1", "s1"), changes)
        .unwrap()
}

#[test]
fn password_factor_is_upserted_from_snapshot() {
    let repo = repo();
    let stmt = update(vec![
        repo.set_token("t"),
        repo.set_factor(SessionFactor::Password {
            last_verified_at: at(),
        }),
    ]);
    assert_eq!(
        stmt.sql(),
        "WITH existing_row AS (SELECT * FROM zitadel.sessions WHERE sessions.instance_id = $1 AND sessions.id = $2), \
         cte_1_0 AS (INSERT INTO zitadel.session_factors (instance_id, session_id, type, last_verified_at) \
         SELECT instance_id, id, $3::TEXT, $4::TIMESTAMPTZ FROM existing_row \
         ON CONFLICT (instance_id, session_id, type) DO UPDATE SET last_verified_at = EXCLUDED.last_verified_at) \
         UPDATE zitadel.sessions SET token = $5, updated_at = NOW() \
         WHERE (sessions.instance_id, sessions.id) IN (SELECT instance_id, id FROM existing_row)"
    );
    assert_eq!(stmt.args().len(), 5);
}

#[test]
fn user_factor_also_sets_user_id() {
    let repo = repo();
    let stmt = update(vec![repo.set_factor(SessionFactor::User {
        user_id: "u1".to_string(),
        last_verified_at: at(),
    })]);
    assert!(stmt.sql().contains(", cte_0_1 AS (INSERT INTO zitadel.session_factors"));
    assert!(stmt.sql().contains(" UPDATE zitadel.sessions SET user_id = $5, updated_at = NOW() "));
    assert_eq!(format!("{:?}", &stmt.args()[4..]), r#"["u1"]"#);
}

#[test]
fn passkey_factor_records_user_verification() {
    let repo = repo();
    let stmt = update(vec![repo.set_factor(SessionFactor::Passkey {
        last_verified_at: at(),
        user_verified: true,
    })]);
    assert!(stmt.sql().contains(
        "(instance_id, session_id, type, last_verified_at, verified_payload) \
         SELECT instance_id, id, $3::TEXT, $4::TIMESTAMPTZ, $5::JSONB FROM existing_row"
    ));
    assert!(stmt.sql().contains(
        "DO UPDATE SET last_verified_at = EXCLUDED.last_verified_at, verified_payload = EXCLUDED.verified_payload"
    ));
}

#[test]
fn challenges_are_limited_to_challengeable_factors() {
    let repo = repo();
    let challenge = |factor_type| SessionChallenge {
        factor_type,
        last_challenged_at: at(),
        payload: serde_json::json!({ "code": "123" }),
    };
    let change = repo.set_challenge(challenge(FactorType::OtpSms)).unwrap();
    let stmt = update(vec![change]);
    assert!(stmt.sql().contains(
        "(instance_id, session_id, type, last_challenged_at, challenged_payload)"
    ));
    assert_eq!(format!("{:?}", &stmt.args()[2..3]), r#"["otp_sms"]"#);

    let err = repo.set_challenge(challenge(FactorType::Password)).unwrap_err();
    assert!(matches!(err, StmtError::Validation(_)));
}

#[test]
fn clear_factor_deletes_through_snapshot() {
    let repo = repo();
    let stmt = update(vec![repo.clear_factor(FactorType::Totp)]);
    assert!(stmt.sql().contains(
        "cte_0_0 AS (DELETE FROM zitadel.session_factors USING existing_row \
         WHERE session_factors.instance_id = existing_row.instance_id \
         AND session_factors.session_id = existing_row.id \
         AND session_factors.type = $3)"
    ));
}

#[test]
fn failed_attempts_increment_from_zero() {
    let repo = repo();
    let stmt = update(vec![repo.increment_failed_attempts(FactorType::Password)]);
    assert!(stmt.sql().contains(
        "cte_0_0 AS (UPDATE zitadel.session_factors \
         SET failed_attempts = COALESCE(failed_attempts, $3) + 1 FROM existing_row \
         WHERE session_factors.instance_id = existing_row.instance_id \
         AND session_factors.session_id = existing_row.id \
         AND session_factors.type = $4)"
    ));
    assert_eq!(format!("{:?}", &stmt.args()[2..]), r#"[0, "password"]"#);
}

#[test]
fn metadata_upserts_each_key_and_deletes_others() {
    let repo = repo();
    let stmt = update(vec![repo.set_metadata(vec![
        SessionMetadata {
            key: "a".to_string(),
            value: b"1".to_vec(),
        },
        SessionMetadata {
            key: "b".to_string(),
            value: b"2".to_vec(),
        },
    ])]);
    let sql = stmt.sql();
    assert!(sql.contains(
        ", cte_0_0 AS (INSERT INTO zitadel.session_metadata (instance_id, session_id, key, value) \
         SELECT instance_id, id, $3::TEXT, $4::BYTEA FROM existing_row \
         ON CONFLICT (instance_id, session_id, key) DO UPDATE SET value = EXCLUDED.value)"
    ));
    assert!(sql.contains(", cte_0_1 AS (INSERT INTO zitadel.session_metadata"));
    assert!(sql.contains(
        ", cte_0_2 AS (DELETE FROM zitadel.session_metadata USING existing_row \
         WHERE session_metadata.instance_id = existing_row.instance_id \
         AND session_metadata.session_id = existing_row.id \
         AND session_metadata.key NOT IN ($7, $8))"
    ));
}

#[test]
fn empty_metadata_deletes_everything() {
    let repo = repo();
    let stmt = update(vec![repo.set_metadata(Vec::new())]);
    assert!(stmt.sql().contains(
        "cte_0_0 AS (DELETE FROM zitadel.session_metadata USING existing_row \
         WHERE session_metadata.instance_id = existing_row.instance_id \
         AND session_metadata.session_id = existing_row.id)"
    ));
    assert!(!stmt.sql().contains("NOT IN"));
}

#[test]
fn metadata_replacement_spans_every_snapshot_row() {
    let repo = repo();
    let stmt = repo
        .update(
            &repo.instance_id_condition("i1"),
            vec![repo.set_metadata(vec![SessionMetadata {
                key: "a".to_string(),
                value: b"1".to_vec(),
            }])],
        )
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "WITH existing_row AS (SELECT * FROM zitadel.sessions WHERE sessions.instance_id = $1), \
         cte_0_0 AS (INSERT INTO zitadel.session_metadata (instance_id, session_id, key, value) \
         SELECT instance_id, id, $2::TEXT, $3::BYTEA FROM existing_row \
         ON CONFLICT (instance_id, session_id, key) DO UPDATE SET value = EXCLUDED.value), \
         cte_0_1 AS (DELETE FROM zitadel.session_metadata USING existing_row \
         WHERE session_metadata.instance_id = existing_row.instance_id \
         AND session_metadata.session_id = existing_row.id \
         AND session_metadata.key NOT IN ($4)) \
         UPDATE zitadel.sessions SET updated_at = NOW() \
         WHERE (sessions.instance_id, sessions.id) IN (SELECT instance_id, id FROM existing_row)"
    );
}

#[test]
fn lifetime_must_fit_into_bigint_seconds() {
    let repo = repo();
    let err = repo.set_lifetime(Duration::MAX).unwrap_err();
    assert!(matches!(err, StmtError::Validation(_)));
    assert!(repo.set_lifetime(Duration::from_secs(i64::MAX as u64)).is_ok());
}

#[test]
fn user_agent_is_referenced_by_cte_name() {
    let repo = repo();
    let stmt = update(vec![
        repo.set_lifetime(Duration::from_secs(3600)).unwrap(),
        repo.set_user_agent(SessionUserAgent {
            fingerprint_id: "fp1".to_string(),
            description: Some("firefox".to_string()),
            ip: Some("127.0.0.1".parse().unwrap()),
            headers: None,
        }),
    ]);
    assert!(stmt.sql().contains(", cte_1_0 AS (INSERT INTO zitadel.session_user_agents"));
    assert!(stmt.sql().contains("RETURNING fingerprint_id)"));
    assert!(stmt.sql().contains(
        " SET lifetime = $7, user_agent_id = (SELECT fingerprint_id FROM cte_1_0), updated_at = NOW() "
    ));
}

#[test]
fn explicit_updated_at_replaces_audit_default() {
    let repo = repo();
    let stmt = update(vec![repo.set_token("t"), repo.set_updated_at(at())]);
    assert_eq!(
        stmt.sql(),
        "UPDATE zitadel.sessions SET token = $1, updated_at = $2 \
         WHERE sessions.instance_id = $3 AND sessions.id = $4"
    );
}

#[test]
fn update_without_instance_is_rejected() {
    let repo = repo();
    let err = repo
        .update(&repo.id_condition("s1"), vec![repo.set_token("t")])
        .unwrap_err();
    assert!(err.is_missing_condition());
}

#[test]
fn exists_factor_correlates_with_session() {
    let repo = repo();
    let cond = Condition::and([
        repo.instance_id_condition("i1"),
        repo.exists_factor(repo.factor_type_condition(FactorType::Passkey)),
    ]);
    let stmt = repo.delete(&cond).unwrap();
    assert_eq!(
        stmt.sql(),
        "DELETE FROM zitadel.sessions WHERE sessions.instance_id = $1 AND \
         EXISTS (SELECT 1 FROM zitadel.session_factors WHERE \
         sessions.instance_id = session_factors.instance_id AND sessions.id = session_factors.session_id \
         AND session_factors.type = $2)"
    );
}

#[test]
fn exists_metadata_does_not_count_as_tenant_restriction() {
    let repo = repo();
    let cond = repo.exists_metadata(Condition::and([
        repo.instance_id_condition("i1"),
        repo.metadata_key_condition(TextOp::Equal, "k"),
    ]));
    assert!(repo.delete(&cond).unwrap_err().is_missing_condition());
}

#[test]
fn create_upserts_user_agent_first() {
    let repo = repo();
    let session = Session {
        instance_id: "i1".to_string(),
        id: "s1".to_string(),
        token: None,
        lifetime: None,
        expiration: None,
        user_id: None,
        creator_id: "c1".to_string(),
        user_agent_id: None,
        created_at: None,
        updated_at: None,
        factors: Vec::new(),
        metadata: Vec::new(),
    };
    let user_agent = SessionUserAgent {
        fingerprint_id: "fp1".to_string(),
        description: None,
        ip: None,
        headers: Some(serde_json::json!({ "accept": ["*/*"] })),
    };

    let stmt = repo.create(&session, Some(&user_agent)).unwrap();
    assert_eq!(
        stmt.sql(),
        "WITH user_agent AS (INSERT INTO zitadel.session_user_agents \
         (instance_id, fingerprint_id, description, ip, headers) VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (instance_id, fingerprint_id) DO UPDATE SET \
         description = EXCLUDED.description, ip = EXCLUDED.ip, headers = EXCLUDED.headers) \
         INSERT INTO zitadel.sessions (instance_id, id, creator_id, user_agent_id, created_at, updated_at) \
         VALUES ($6, $7, $8, $9, DEFAULT, DEFAULT) RETURNING created_at, updated_at"
    );
    assert_eq!(format!("{:?}", &stmt.args()[5..]), r#"["i1", "s1", "c1", "fp1"]"#);

    let stmt = repo.create(&session, None).unwrap();
    assert_eq!(
        stmt.sql(),
        "INSERT INTO zitadel.sessions (instance_id, id, creator_id, user_agent_id, created_at, updated_at) \
         VALUES ($1, $2, $3, NULL, DEFAULT, DEFAULT) RETURNING created_at, updated_at"
    );
}

#[test]
fn list_aggregates_children_per_session() {
    let repo = repo();
    let stmt = repo
        .list(QueryOpts::new().condition(Condition::and([
            repo.instance_id_condition("i1"),
            repo.user_id_condition("u1"),
        ])))
        .unwrap();
    let sql = stmt.sql();
    assert!(sql.starts_with("SELECT sessions.instance_id, sessions.id, sessions.token"));
    assert!(sql.contains(" AS factors, "));
    assert!(sql.contains(" AS metadata_values FROM zitadel.sessions LEFT JOIN zitadel.session_factors ON "));
    assert!(sql.ends_with(
        " WHERE sessions.instance_id = $1 AND sessions.user_id = $2 \
         GROUP BY sessions.instance_id, sessions.id"
    ));
}

#[test]
fn get_limits_to_one_row() {
    let repo = repo();
    let stmt = repo
        .get(QueryOpts::new().condition(repo.primary_key_condition("i1", "s1")))
        .unwrap();
    assert!(stmt.sql().ends_with("GROUP BY sessions.instance_id, sessions.id LIMIT $3"));
    assert!(repo.get(QueryOpts::new()).unwrap_err().is_missing_condition());
}

#[test]
fn metadata_is_read_as_ordered_arrays() {
    let repo = repo();
    let stmt = repo
        .get(QueryOpts::new().condition(repo.primary_key_condition("i1", "s1")))
        .unwrap();
    assert!(stmt.sql().contains(
        " ARRAY(SELECT session_metadata.key FROM zitadel.session_metadata \
         WHERE session_metadata.instance_id = sessions.instance_id AND session_metadata.session_id = sessions.id \
         ORDER BY session_metadata.key) AS metadata_keys, \
         ARRAY(SELECT session_metadata.value FROM zitadel.session_metadata \
         WHERE session_metadata.instance_id = sessions.instance_id AND session_metadata.session_id = sessions.id \
         ORDER BY session_metadata.key) AS metadata_values FROM zitadel.sessions "
    ));
    assert!(!stmt.sql().contains("LEFT JOIN zitadel.session_metadata"));
}

#[test]
fn stored_factor_reads_aggregated_json() {
    let factor: StoredFactor = serde_json::from_value(serde_json::json!({
        "type": "otp_email",
        "lastChallengedAt": "2025-01-02T03:04:05+00:00",
        "challengedPayload": { "code": "x" },
        "lastVerifiedAt": null,
        "verifiedPayload": null,
        "failedAttempts": 2
    }))
    .unwrap();
    assert_eq!(factor.factor_type, FactorType::OtpEmail);
    assert_eq!(factor.last_challenged_at, Some(at()));
    assert_eq!(factor.failed_attempts, Some(2));
    assert!(factor.last_verified_at.is_none());
}
