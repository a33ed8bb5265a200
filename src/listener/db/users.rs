/**
 * User Accounts
 *
 * This module handles user rows and their database operations, including
 * the one-shot legacy credential bridge for accounts migrated from the old
 * site without a usable password hash.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgConnection;

/// A user account row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user id
    pub id: i64,
    /// Login name (unique)
    pub username: String,
    /// Display name shown to other users
    pub nickname: String,
    /// Bcrypt password hash
    ///
    /// `None` marks a migrated legacy account that has not logged in yet;
    /// such accounts authenticate once through the legacy credential bridge,
    /// which writes a real hash here.
    pub password: Option<String>,
    /// Authorization level (0 guest, 1 user, 2 admin)
    pub level: i32,
    /// Soft-delete flag; deleted users are invisible to every lookup
    pub deleted: bool,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Public view of this user, safe to send to any client
    pub fn public_view(&self) -> Value {
        json!({
            "id": self.id,
            "nickname": self.nickname,
            "level": self.level,
        })
    }

    /// Administrative view, including the login name and deletion state
    pub fn admin_view(&self) -> Value {
        json!({
            "id": self.id,
            "username": self.username,
            "nickname": self.nickname,
            "level": self.level,
            "deleted": self.deleted,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// A legacy credential bridge row
///
/// Carries the old site's SHA-256 password digest for a migrated account.
/// Destroyed on first successful login.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LegacyCredential {
    /// User this bridge belongs to
    pub user_id: i64,
    /// Hex SHA-256 digest of the old password
    pub password_sha: String,
}

/// Get a non-deleted user by id
pub async fn get_active_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, nickname, password, level, deleted, created_at
        FROM users
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(user)
}

/// Get a non-deleted user by login name
pub async fn get_active_by_username(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, nickname, password, level, deleted, created_at
        FROM users
        WHERE username = $1 AND deleted = FALSE
        "#,
    )
    .bind(username)
    .fetch_optional(conn)
    .await?;

    Ok(user)
}

/// Check whether a login name is already taken
///
/// Deleted accounts still reserve their name; the column is unique.
pub async fn username_taken(conn: &mut PgConnection, username: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(conn)
        .await?;

    Ok(row.is_some())
}

/// Create a new user
pub async fn create(
    conn: &mut PgConnection,
    username: &str,
    nickname: &str,
    password_hash: &str,
    level: i32,
) -> Result<User, sqlx::Error> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, nickname, password, level)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, nickname, password, level, deleted, created_at
        "#,
    )
    .bind(username)
    .bind(nickname)
    .bind(password_hash)
    .bind(level)
    .fetch_one(conn)
    .await?;

    Ok(user)
}

/// Update a user's display name
pub async fn update_nickname(
    conn: &mut PgConnection,
    id: i64,
    nickname: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET nickname = $1 WHERE id = $2")
        .bind(nickname)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Replace a user's password hash
pub async fn update_password(
    conn: &mut PgConnection,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Change a user's authorization level
pub async fn set_level(conn: &mut PgConnection, id: i64, level: i32) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET level = $1 WHERE id = $2")
        .bind(level)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Soft-delete a user
///
/// Returns whether a live row was actually flagged.
pub async fn soft_delete(conn: &mut PgConnection, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET deleted = TRUE WHERE id = $1 AND deleted = FALSE")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count users, optionally including deleted accounts
pub async fn count(conn: &mut PgConnection, include_deleted: bool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE deleted = FALSE OR $1")
            .bind(include_deleted)
            .fetch_one(conn)
            .await?;

    Ok(count)
}

/// List users ordered by login name
///
/// `limit` of `None` returns everything after `start`.
pub async fn list(
    conn: &mut PgConnection,
    include_deleted: bool,
    start: i64,
    limit: Option<i64>,
) -> Result<Vec<User>, sqlx::Error> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, nickname, password, level, deleted, created_at
        FROM users
        WHERE deleted = FALSE OR $1
        ORDER BY username ASC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(include_deleted)
    .bind(start)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(users)
}

/// Get the legacy credential bridge row for a user, if one remains
pub async fn get_legacy_credential(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Option<LegacyCredential>, sqlx::Error> {
    let credential = sqlx::query_as::<_, LegacyCredential>(
        "SELECT user_id, password_sha FROM legacy_credentials WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(credential)
}

/// Destroy a user's legacy credential bridge row
pub async fn delete_legacy_credential(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM legacy_credentials WHERE user_id = $1")
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(())
}
