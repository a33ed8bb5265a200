/**
 * Forum Storage
 *
 * Row types and queries for sections, boards, threads, posts, post edits
 * and per-user read markers.
 *
 * # Visibility
 *
 * Boards carry a `req_level`; a caller below that level must not be able to
 * tell a restricted board from a missing one, so every read path filters
 * with the caller's level and the handlers answer 404 either way. Sections
 * are visible when they contain at least one visible board.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgConnection;

/// A forum section row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Section {
    /// Unique section id
    pub id: i64,
    /// Section title
    pub title: String,
    /// Ordering weight, ascending
    pub sort_index: i32,
    /// Soft-delete flag
    pub deleted: bool,
}

impl Section {
    /// Wire view of this section
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "sort_index": self.sort_index,
        })
    }
}

/// A forum board row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    /// Unique board id
    pub id: i64,
    /// Section this board belongs to
    pub section_id: i64,
    /// Board title
    pub title: String,
    /// Board description
    pub description: String,
    /// Minimum authorization level required to see this board
    pub req_level: i32,
    /// Ordering weight, ascending
    pub sort_index: i32,
    /// Soft-delete flag
    pub deleted: bool,
}

impl Board {
    /// Wire view of this board
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "section": self.section_id,
            "title": self.title,
            "description": self.description,
            "req_level": self.req_level,
            "sort_index": self.sort_index,
        })
    }
}

/// A forum thread row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    /// Unique thread id
    pub id: i64,
    /// Board this thread belongs to
    pub board_id: i64,
    /// Author
    pub user_id: i64,
    /// Thread title
    pub title: String,
    /// Pinned above other threads when set
    pub sticky: bool,
    /// Closed threads accept no new posts
    pub closed: bool,
    /// View counter
    pub views: i32,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
    /// Bumped whenever a post is added
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag
    pub deleted: bool,
}

impl Thread {
    /// Wire view of this thread
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "board": self.board_id,
            "user": self.user_id,
            "title": self.title,
            "sticky": self.sticky,
            "closed": self.closed,
            "views": self.views,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

/// A forum post row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    /// Unique post id
    pub id: i64,
    /// Thread this post belongs to
    pub thread_id: i64,
    /// Author
    pub user_id: i64,
    /// Post body
    pub message: String,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag
    pub deleted: bool,
}

impl Post {
    /// Wire view of this post
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "thread": self.thread_id,
            "user": self.user_id,
            "message": self.message,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// A post edit record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostEdit {
    /// Unique edit id
    pub id: i64,
    /// Edited post
    pub post_id: i64,
    /// Who edited
    pub user_id: i64,
    /// Edit note
    pub message: String,
    /// When the edit happened
    pub created_at: DateTime<Utc>,
}

impl PostEdit {
    /// Wire view of this edit
    pub fn view(&self) -> Value {
        json!({
            "id": self.id,
            "post": self.post_id,
            "user": self.user_id,
            "message": self.message,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// Sections containing at least one board visible at `level`
pub async fn sections_visible(
    conn: &mut PgConnection,
    level: i32,
) -> Result<Vec<Section>, sqlx::Error> {
    let sections = sqlx::query_as::<_, Section>(
        r#"
        SELECT s.id, s.title, s.sort_index, s.deleted
        FROM forum_sections s
        WHERE s.deleted = FALSE
          AND EXISTS (
            SELECT 1 FROM forum_boards b
            WHERE b.section_id = s.id AND b.deleted = FALSE AND b.req_level <= $1
          )
        ORDER BY s.sort_index ASC, s.id ASC
        "#,
    )
    .bind(level)
    .fetch_all(conn)
    .await?;

    Ok(sections)
}

/// Boards visible at `level`, optionally restricted to one section
pub async fn boards_visible(
    conn: &mut PgConnection,
    level: i32,
    section_id: Option<i64>,
) -> Result<Vec<Board>, sqlx::Error> {
    let boards = sqlx::query_as::<_, Board>(
        r#"
        SELECT id, section_id, title, description, req_level, sort_index, deleted
        FROM forum_boards
        WHERE deleted = FALSE
          AND req_level <= $1
          AND ($2::BIGINT IS NULL OR section_id = $2)
        ORDER BY sort_index ASC, id ASC
        "#,
    )
    .bind(level)
    .bind(section_id)
    .fetch_all(conn)
    .await?;

    Ok(boards)
}

/// Get a non-deleted section by id
pub async fn get_section(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<Section>, sqlx::Error> {
    let section = sqlx::query_as::<_, Section>(
        "SELECT id, title, sort_index, deleted FROM forum_sections WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(section)
}

/// Get a non-deleted board by id
pub async fn get_board(conn: &mut PgConnection, id: i64) -> Result<Option<Board>, sqlx::Error> {
    let board = sqlx::query_as::<_, Board>(
        r#"
        SELECT id, section_id, title, description, req_level, sort_index, deleted
        FROM forum_boards
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(board)
}

/// Get a non-deleted thread by id
pub async fn get_thread(conn: &mut PgConnection, id: i64) -> Result<Option<Thread>, sqlx::Error> {
    let thread = sqlx::query_as::<_, Thread>(
        r#"
        SELECT id, board_id, user_id, title, sticky, closed, views, created_at, updated_at, deleted
        FROM forum_threads
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(thread)
}

/// Get a non-deleted post by id
pub async fn get_post(conn: &mut PgConnection, id: i64) -> Result<Option<Post>, sqlx::Error> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, thread_id, user_id, message, created_at, deleted
        FROM forum_posts
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(post)
}

/// Count live threads on a board
pub async fn count_threads(conn: &mut PgConnection, board_id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM forum_threads WHERE board_id = $1 AND deleted = FALSE",
    )
    .bind(board_id)
    .fetch_one(conn)
    .await?;

    Ok(count)
}

/// Threads on a board, sticky first, most recent activity next
pub async fn threads_for_board(
    conn: &mut PgConnection,
    board_id: i64,
    start: i64,
    limit: Option<i64>,
) -> Result<Vec<Thread>, sqlx::Error> {
    let threads = sqlx::query_as::<_, Thread>(
        r#"
        SELECT id, board_id, user_id, title, sticky, closed, views, created_at, updated_at, deleted
        FROM forum_threads
        WHERE board_id = $1 AND deleted = FALSE
        ORDER BY sticky DESC, updated_at DESC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(board_id)
    .bind(start)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(threads)
}

/// Count live posts in a thread
pub async fn count_posts(conn: &mut PgConnection, thread_id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM forum_posts WHERE thread_id = $1 AND deleted = FALSE",
    )
    .bind(thread_id)
    .fetch_one(conn)
    .await?;

    Ok(count)
}

/// Posts in a thread, oldest first
pub async fn posts_for_thread(
    conn: &mut PgConnection,
    thread_id: i64,
    start: i64,
    limit: Option<i64>,
) -> Result<Vec<Post>, sqlx::Error> {
    let posts = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, thread_id, user_id, message, created_at, deleted
        FROM forum_posts
        WHERE thread_id = $1 AND deleted = FALSE
        ORDER BY created_at ASC, id ASC
        OFFSET $2 LIMIT $3
        "#,
    )
    .bind(thread_id)
    .bind(start)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    Ok(posts)
}

/// Edit records for a post, oldest first
pub async fn edits_for_post(
    conn: &mut PgConnection,
    post_id: i64,
) -> Result<Vec<PostEdit>, sqlx::Error> {
    let edits = sqlx::query_as::<_, PostEdit>(
        r#"
        SELECT id, post_id, user_id, message, created_at
        FROM forum_post_edits
        WHERE post_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(conn)
    .await?;

    Ok(edits)
}

/// When a user last read a thread, if ever
pub async fn last_read_at(
    conn: &mut PgConnection,
    thread_id: i64,
    user_id: i64,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "SELECT created_at FROM forum_last_reads WHERE thread_id = $1 AND user_id = $2",
    )
    .bind(thread_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|(at,)| at))
}

/// Mark a thread read by a user, refreshing an existing marker
pub async fn mark_read(
    conn: &mut PgConnection,
    thread_id: i64,
    user_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO forum_last_reads (thread_id, user_id, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (thread_id, user_id) DO UPDATE SET created_at = NOW()
        "#,
    )
    .bind(thread_id)
    .bind(user_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Create a thread
pub async fn insert_thread(
    conn: &mut PgConnection,
    board_id: i64,
    user_id: i64,
    title: &str,
    sticky: bool,
    closed: bool,
) -> Result<Thread, sqlx::Error> {
    let thread = sqlx::query_as::<_, Thread>(
        r#"
        INSERT INTO forum_threads (board_id, user_id, title, sticky, closed)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, board_id, user_id, title, sticky, closed, views, created_at, updated_at, deleted
        "#,
    )
    .bind(board_id)
    .bind(user_id)
    .bind(title)
    .bind(sticky)
    .bind(closed)
    .fetch_one(conn)
    .await?;

    Ok(thread)
}

/// Update thread fields, returning the fresh row
pub async fn update_thread(
    conn: &mut PgConnection,
    id: i64,
    title: Option<&str>,
    sticky: Option<bool>,
    closed: Option<bool>,
) -> Result<Thread, sqlx::Error> {
    let thread = sqlx::query_as::<_, Thread>(
        r#"
        UPDATE forum_threads
        SET title = COALESCE($1, title),
            sticky = COALESCE($2, sticky),
            closed = COALESCE($3, closed)
        WHERE id = $4
        RETURNING id, board_id, user_id, title, sticky, closed, views, created_at, updated_at, deleted
        "#,
    )
    .bind(title)
    .bind(sticky)
    .bind(closed)
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(thread)
}

/// Bump a thread's activity timestamp
pub async fn touch_thread(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE forum_threads SET updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Create a post
pub async fn insert_post(
    conn: &mut PgConnection,
    thread_id: i64,
    user_id: i64,
    message: &str,
) -> Result<Post, sqlx::Error> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO forum_posts (thread_id, user_id, message)
        VALUES ($1, $2, $3)
        RETURNING id, thread_id, user_id, message, created_at, deleted
        "#,
    )
    .bind(thread_id)
    .bind(user_id)
    .bind(message)
    .fetch_one(conn)
    .await?;

    Ok(post)
}

/// Replace a post's body
pub async fn update_post_message(
    conn: &mut PgConnection,
    id: i64,
    message: &str,
) -> Result<Post, sqlx::Error> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        UPDATE forum_posts SET message = $1
        WHERE id = $2
        RETURNING id, thread_id, user_id, message, created_at, deleted
        "#,
    )
    .bind(message)
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(post)
}

/// Record an edit note against a post
pub async fn insert_post_edit(
    conn: &mut PgConnection,
    post_id: i64,
    user_id: i64,
    message: &str,
) -> Result<PostEdit, sqlx::Error> {
    let edit = sqlx::query_as::<_, PostEdit>(
        r#"
        INSERT INTO forum_post_edits (post_id, user_id, message)
        VALUES ($1, $2, $3)
        RETURNING id, post_id, user_id, message, created_at
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(message)
    .fetch_one(conn)
    .await?;

    Ok(edit)
}

/// Create a section
pub async fn insert_section(
    conn: &mut PgConnection,
    title: &str,
    sort_index: i32,
) -> Result<Section, sqlx::Error> {
    let section = sqlx::query_as::<_, Section>(
        r#"
        INSERT INTO forum_sections (title, sort_index)
        VALUES ($1, $2)
        RETURNING id, title, sort_index, deleted
        "#,
    )
    .bind(title)
    .bind(sort_index)
    .fetch_one(conn)
    .await?;

    Ok(section)
}

/// Update section fields, returning the fresh row
pub async fn update_section(
    conn: &mut PgConnection,
    id: i64,
    title: Option<&str>,
    sort_index: Option<i32>,
) -> Result<Section, sqlx::Error> {
    let section = sqlx::query_as::<_, Section>(
        r#"
        UPDATE forum_sections
        SET title = COALESCE($1, title),
            sort_index = COALESCE($2, sort_index)
        WHERE id = $3
        RETURNING id, title, sort_index, deleted
        "#,
    )
    .bind(title)
    .bind(sort_index)
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(section)
}

/// Create a board
pub async fn insert_board(
    conn: &mut PgConnection,
    section_id: i64,
    title: &str,
    description: &str,
    req_level: i32,
    sort_index: i32,
) -> Result<Board, sqlx::Error> {
    let board = sqlx::query_as::<_, Board>(
        r#"
        INSERT INTO forum_boards (section_id, title, description, req_level, sort_index)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, section_id, title, description, req_level, sort_index, deleted
        "#,
    )
    .bind(section_id)
    .bind(title)
    .bind(description)
    .bind(req_level)
    .bind(sort_index)
    .fetch_one(conn)
    .await?;

    Ok(board)
}

/// Update board fields, returning the fresh row
pub async fn update_board(
    conn: &mut PgConnection,
    id: i64,
    title: Option<&str>,
    description: Option<&str>,
    req_level: Option<i32>,
    sort_index: Option<i32>,
) -> Result<Board, sqlx::Error> {
    let board = sqlx::query_as::<_, Board>(
        r#"
        UPDATE forum_boards
        SET title = COALESCE($1, title),
            description = COALESCE($2, description),
            req_level = COALESCE($3, req_level),
            sort_index = COALESCE($4, sort_index)
        WHERE id = $5
        RETURNING id, section_id, title, description, req_level, sort_index, deleted
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(req_level)
    .bind(sort_index)
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(board)
}

/// Soft-delete a post
pub async fn soft_delete_post(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE forum_posts SET deleted = TRUE WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Soft-delete a thread and every post in it
pub async fn soft_delete_thread(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE forum_posts SET deleted = TRUE WHERE thread_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE forum_threads SET deleted = TRUE WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Soft-delete a board and every thread and post under it
pub async fn soft_delete_board(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE forum_posts SET deleted = TRUE
        WHERE thread_id IN (SELECT id FROM forum_threads WHERE board_id = $1)
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE forum_threads SET deleted = TRUE WHERE board_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE forum_boards SET deleted = TRUE WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Soft-delete a section and every board under it
pub async fn soft_delete_section(conn: &mut PgConnection, id: i64) -> Result<(), sqlx::Error> {
    let boards: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM forum_boards WHERE section_id = $1 AND deleted = FALSE")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
    for (board_id,) in boards {
        soft_delete_board(&mut *conn, board_id).await?;
    }
    sqlx::query("UPDATE forum_sections SET deleted = TRUE WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}
