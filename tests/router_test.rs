//! End-to-end router tests
//!
//! These run real requests through the full pipeline - router, session
//! resolution, guards, handlers, storage transaction and outbound channel -
//! against a PostgreSQL database, with a recording transport standing in
//! for the broker.
//!
//! Every test here needs a reachable test database (`DATABASE_URL`, or the
//! default local `palaver_test`) and is ignored otherwise.

mod common;

use common::database::TestDatabase;
use common::fixtures::{self, TEST_PASSWORD};
use common::transport::RecordingTransport;
use palaver::listener::{MessageRouter, UserSession};
use palaver::shared::envelope::{InboundEnvelope, InboundHead, TransportEnvelope};
use serde_json::{json, Value};
use serial_test::serial;

fn request(
    session_key: Option<&str>,
    route: &str,
    receipt: &str,
    data: Value,
) -> InboundEnvelope {
    InboundEnvelope {
        head: InboundHead {
            connection_id: "conn-test".to_string(),
            session_key: session_key.map(|key| key.to_string()),
        },
        body: json!({
            "route": route,
            "receipt": receipt,
            "data": data,
        }),
    }
}

fn error_code(envelope: &TransportEnvelope) -> Option<u64> {
    envelope.body["data"]["error_code"].as_u64()
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_login_commits_response_control_and_broadcast_together() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(
        None,
        "auth.login",
        "r-login",
        json!({"username": "erika", "password": TEST_PASSWORD}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 3);

    // 1: the direct response carrying the fresh session key
    let response = &published[0];
    assert_eq!(response.body["error"], json!(false));
    assert_eq!(response.body["receipt"], json!("r-login"));
    let session_key = response.body["data"]["session_key"]
        .as_str()
        .expect("session key missing from login response")
        .to_string();

    // 2: the control envelope teaching the socket edge the new level
    let control = &published[1];
    assert!(control.head.is_control);
    assert_eq!(control.body["level"], json!(1));
    assert_eq!(control.body["session_key"], json!(session_key));

    // 3: the avoid-self broadcast announcing the login
    let broadcast = &published[2];
    assert!(broadcast.head.broadcast);
    assert!(broadcast.head.avoid_self);
    assert!(!broadcast.head.is_control);

    // The session row is durably visible
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE session_key = $1")
        .bind(&session_key)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_wrong_password_gets_401_and_no_session() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let before: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(db.pool())
        .await
        .unwrap();

    let envelope = request(
        None,
        "auth.login",
        "r-bad",
        json!({"username": "erika", "password": "wrong password"}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].body["error"], json!(true));
    assert_eq!(error_code(&published[0]), Some(401));

    let after: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_restricted_board_insert_post_is_404_with_no_writes() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    // A level-1 member posting into an admin-only board: deliberately
    // indistinguishable from "thread doesn't exist"
    let envelope = request(
        Some(&seeded.member_key),
        "forum.insert_post",
        "r-post",
        json!({"thread": seeded.restricted_thread_id, "message": "sneaky"}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(404));
    assert!(!published[0].head.broadcast);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM forum_posts WHERE thread_id = $1")
            .bind(seeded.restricted_thread_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_insert_post_broadcasts_at_board_level() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(
        Some(&seeded.member_key),
        "forum.insert_post",
        "r-post",
        json!({"thread": seeded.thread_id, "message": "hello all"}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].body["error"], json!(false));
    assert!(published[1].head.broadcast);
    assert!(published[1].head.avoid_self);
    assert_eq!(published[1].head.req_level, 0);

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM forum_posts WHERE thread_id = $1 AND message = 'hello all'",
    )
    .bind(seeded.thread_id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_guard_denial_commits_empty_transaction() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    // Anonymous caller on an admin operation: 403 through the normal
    // channel, nothing written
    let envelope = request(
        None,
        "news.insert_news_post",
        "r-news",
        json!({"header": "Hi", "message": "There"}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(403));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_items")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_schema_guard_reports_every_missing_field() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(None, "auth.login", "r-empty", json!({}));
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(450));
    let messages = published[0].body["data"]["error_messages"]
        .as_array()
        .unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_orphaned_session_self_heals() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;

    // Soft-delete the member behind the session's back
    sqlx::query("UPDATE users SET deleted = TRUE WHERE id = $1")
        .bind(seeded.member_id)
        .execute(db.pool())
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let session = UserSession::resolve(&mut conn, Some(&seeded.member_key))
        .await
        .unwrap();
    assert!(!session.is_valid());

    // The orphan was removed as a side effect
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE session_key = $1")
        .bind(&seeded.member_key)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    // Resolving the same key again is anonymous, not an error
    let session = UserSession::resolve(&mut conn, Some(&seeded.member_key))
        .await
        .unwrap();
    assert!(!session.is_valid());
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_nested_admin_route_deletes_user_and_sessions() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(
        Some(&seeded.admin_key),
        "admin.users.delete",
        "r-del",
        json!({"user": seeded.member_id}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].body["error"], json!(false));

    let (deleted,): (bool,) = sqlx::query_as("SELECT deleted FROM users WHERE id = $1")
        .bind(seeded.member_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert!(deleted);

    // The member's sessions went with the account
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
        .bind(seeded.member_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_nested_admin_route_rejects_non_admin() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(
        Some(&seeded.member_key),
        "admin.users.delete",
        "r-del",
        json!({"user": seeded.admin_id}),
    );
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(403));
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_unknown_sub_route_is_surfaced_as_404() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(None, "forum.no_such_op", "r-404", json!({}));
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(404));
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_legacy_account_bridges_exactly_once() {
    let db = TestDatabase::new().await;
    fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    // A migrated account: no password, only the old site's SHA-256 digest
    let (user_id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (username, nickname, password, level) \
         VALUES ('vanha', 'Vanha', NULL, 1) RETURNING id",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    // SHA-256 of TEST_PASSWORD, as the converter would have written it
    let digest: String = {
        use sha2::Digest;
        sha2::Sha256::digest(TEST_PASSWORD.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    };
    sqlx::query("INSERT INTO legacy_credentials (user_id, password_sha) VALUES ($1, $2)")
        .bind(user_id)
        .bind(&digest)
        .execute(db.pool())
        .await
        .unwrap();

    let envelope = request(
        None,
        "auth.login",
        "r-legacy",
        json!({"username": "vanha", "password": TEST_PASSWORD}),
    );
    router.handle(&transport, &envelope).await.unwrap();
    assert_eq!(transport.envelopes()[0].body["error"], json!(false));

    // The bridge is gone and a real credential is in place
    let (bridges,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM legacy_credentials WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(bridges, 0);
    let (password,): (Option<String>,) =
        sqlx::query_as("SELECT password FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert!(password.is_some());

    // A second login takes the normal bcrypt path
    transport.clear();
    let envelope = request(
        None,
        "auth.login",
        "r-legacy-2",
        json!({"username": "vanha", "password": TEST_PASSWORD}),
    );
    router.handle(&transport, &envelope).await.unwrap();
    assert_eq!(transport.envelopes()[0].body["error"], json!(false));
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_unhandled_fault_rolls_back_writes_and_sends_500() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    // Sabotage the edit table so update_post faults *after* it has
    // already updated the post row inside the transaction
    sqlx::query("ALTER TABLE forum_post_edits RENAME TO forum_post_edits_gone")
        .execute(db.pool())
        .await
        .unwrap();

    let envelope = request(
        Some(&seeded.member_key),
        "forum.update_post",
        "r-fault",
        json!({
            "post": seeded.post_id,
            "message": "rewritten",
            "edit_message": "typo fix"
        }),
    );
    let result = router.handle(&transport, &envelope).await;
    assert!(result.is_err());

    // Only the direct best-effort 500 reached the transport
    let published = transport.envelopes();
    assert_eq!(published.len(), 1);
    assert_eq!(error_code(&published[0]), Some(500));
    assert_eq!(published[0].body["receipt"], json!("r-fault"));

    // The post update was rolled back with everything else
    let (message,): (String,) = sqlx::query_as("SELECT message FROM forum_posts WHERE id = $1")
        .bind(seeded.post_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(message, "First post");

    // Restore the schema for the next test
    sqlx::query("ALTER TABLE forum_post_edits_gone RENAME TO forum_post_edits")
        .execute(db.pool())
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_logout_invalidates_session_and_clears_endpoint_state() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    let envelope = request(Some(&seeded.member_key), "auth.logout", "r-out", json!({}));
    router.handle(&transport, &envelope).await.unwrap();

    let published = transport.envelopes();
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].body["error"], json!(false));
    assert!(published[1].head.is_control);
    assert_eq!(published[1].body["session_key"], json!(null));
    assert_eq!(published[1].body["level"], json!(0));
    assert!(published[2].head.broadcast);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE session_key = $1")
        .bind(&seeded.member_key)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL test database"]
async fn test_get_threads_hides_restricted_board_from_listing() {
    let db = TestDatabase::new().await;
    let seeded = fixtures::seed(db.pool()).await;
    let router = MessageRouter::new(db.pool().clone());
    let transport = RecordingTransport::new();

    // The guest sees the open board
    let envelope = request(None, "forum.get_boards", "r-boards", json!({}));
    router.handle(&transport, &envelope).await.unwrap();
    let boards = transport.envelopes()[0].body["data"]["boards"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0]["id"], json!(seeded.board_id));

    // The admin sees both
    transport.clear();
    let envelope = request(Some(&seeded.admin_key), "forum.get_boards", "r-boards2", json!({}));
    router.handle(&transport, &envelope).await.unwrap();
    let boards = transport.envelopes()[0].body["data"]["boards"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(boards.len(), 2);
}
