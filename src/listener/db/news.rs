/**
 * News Storage
 *
 * Row type and queries for front-page news items. Authors are recorded by
 * display-name snapshot rather than foreign key, so renaming or deleting an
 * account never rewrites published news.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgConnection;

/// A news item row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsItem {
    /// Unique news item id
    pub id: i64,
    /// Author display name at publication time
    pub nickname: String,
    /// Headline
    pub header: String,
    /// Body text
    pub message: String,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag
    pub deleted: bool,
}

impl NewsItem {
    /// Wire view of this news item
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "nickname": self.nickname,
            "header": self.header,
            "message": self.message,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// Count live news items
pub async fn count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news_items WHERE deleted = FALSE")
        .fetch_one(conn)
        .await?;

    Ok(count)
}

/// List news items, newest first
pub async fn list(
    conn: &mut PgConnection,
    start: i64,
    limit: Option<i64>,
) -> Result<Vec<NewsItem>, sqlx::Error> {
    let items = sqlx::query_as::<_, NewsItem>(
        r#"
        SELECT id, nickname, header, message, created_at, deleted
        FROM news_items
        WHERE deleted = FALSE
        ORDER BY id DESC
        OFFSET $1 LIMIT $2
        "#,
    )
    .bind(start)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

/// Get a live news item by id
pub async fn get(conn: &mut PgConnection, id: i64) -> Result<Option<NewsItem>, sqlx::Error> {
    let item = sqlx::query_as::<_, NewsItem>(
        r#"
        SELECT id, nickname, header, message, created_at, deleted
        FROM news_items
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(item)
}

/// Publish a news item
pub async fn insert(
    conn: &mut PgConnection,
    nickname: &str,
    header: &str,
    message: &str,
) -> Result<NewsItem, sqlx::Error> {
    let item = sqlx::query_as::<_, NewsItem>(
        r#"
        INSERT INTO news_items (nickname, header, message)
        VALUES ($1, $2, $3)
        RETURNING id, nickname, header, message, created_at, deleted
        "#,
    )
    .bind(nickname)
    .bind(header)
    .bind(message)
    .fetch_one(conn)
    .await?;

    Ok(item)
}

/// Update a news item, returning the fresh row
pub async fn update(
    conn: &mut PgConnection,
    id: i64,
    header: Option<&str>,
    message: Option<&str>,
) -> Result<NewsItem, sqlx::Error> {
    let item = sqlx::query_as::<_, NewsItem>(
        r#"
        UPDATE news_items
        SET header = COALESCE($1, header),
            message = COALESCE($2, message)
        WHERE id = $3
        RETURNING id, nickname, header, message, created_at, deleted
        "#,
    )
    .bind(header)
    .bind(message)
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(item)
}

/// Soft-delete a news item
pub async fn soft_delete(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE news_items SET deleted = TRUE WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}
