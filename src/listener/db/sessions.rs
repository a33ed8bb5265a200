/**
 * Session Rows
 *
 * This module handles durable session records. A session is created on
 * login, looked up on every request by its random 32-character key, and
 * destroyed on logout or when its user disappears.
 */
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

/// A session row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    /// Unique session id
    pub id: i64,
    /// Random high-entropy key identifying the session on the wire
    pub session_key: String,
    /// User this session belongs to
    pub user_id: i64,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
    /// Last-activity timestamp, updated best-effort on resolution
    pub activity_at: DateTime<Utc>,
}

/// Get a session by key
pub async fn get_by_key(
    conn: &mut PgConnection,
    session_key: &str,
) -> Result<Option<SessionRow>, sqlx::Error> {
    let session = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT id, session_key, user_id, created_at, activity_at
        FROM sessions
        WHERE session_key = $1
        "#,
    )
    .bind(session_key)
    .fetch_optional(conn)
    .await?;

    Ok(session)
}

/// Create a session for a user with a fresh random key
pub async fn create(conn: &mut PgConnection, user_id: i64) -> Result<SessionRow, sqlx::Error> {
    let session_key = Uuid::new_v4().simple().to_string();

    let session = sqlx::query_as::<_, SessionRow>(
        r#"
        INSERT INTO sessions (session_key, user_id)
        VALUES ($1, $2)
        RETURNING id, session_key, user_id, created_at, activity_at
        "#,
    )
    .bind(&session_key)
    .bind(user_id)
    .fetch_one(conn)
    .await?;

    Ok(session)
}

/// Delete a session by id
pub async fn delete_by_id(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete a session by key
pub async fn delete_by_key(conn: &mut PgConnection, session_key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE session_key = $1")
        .bind(session_key)
        .execute(conn)
        .await?;

    Ok(())
}

/// Delete every session a user holds
///
/// Used when an account is removed, so the deletion takes effect
/// immediately instead of waiting for orphan cleanup.
pub async fn delete_for_user(conn: &mut PgConnection, user_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Update a session's last-activity timestamp
pub async fn touch(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sessions SET activity_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}
