//! Seed data for integration tests
//!
//! Creates the users, sessions and forum structure the end-to-end tests
//! run against: a member, an admin, a legacy account, an open board and a
//! board restricted to admins, with one thread and one post on the open
//! board.

use sqlx::PgPool;
use uuid::Uuid;

/// Password every seeded account uses
pub const TEST_PASSWORD: &str = "password123";

/// Ids and keys of the seeded world
pub struct Seeded {
    pub member_id: i64,
    pub admin_id: i64,
    pub member_key: String,
    pub admin_key: String,
    pub section_id: i64,
    pub board_id: i64,
    pub restricted_board_id: i64,
    pub thread_id: i64,
    pub restricted_thread_id: i64,
    pub post_id: i64,
}

/// Create a user and return its id
pub async fn create_user(pool: &PgPool, username: &str, nickname: &str, level: i32) -> i64 {
    // Low bcrypt cost keeps the test suite fast
    let hash = bcrypt::hash(TEST_PASSWORD, 4).expect("Failed to hash test password");
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (username, nickname, password, level) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(username)
    .bind(nickname)
    .bind(hash)
    .bind(level)
    .fetch_one(pool)
    .await
    .expect("Failed to create test user");
    id
}

/// Create a session for a user and return its key
pub async fn create_session(pool: &PgPool, user_id: i64) -> String {
    let key = Uuid::new_v4().simple().to_string();
    sqlx::query("INSERT INTO sessions (session_key, user_id) VALUES ($1, $2)")
        .bind(&key)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to create test session");
    key
}

/// Seed the standard test world
pub async fn seed(pool: &PgPool) -> Seeded {
    let member_id = create_user(pool, "erika", "Erika", 1).await;
    let admin_id = create_user(pool, "tuisku", "Tuisku", 2).await;
    let member_key = create_session(pool, member_id).await;
    let admin_key = create_session(pool, admin_id).await;

    let (section_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_sections (title, sort_index) VALUES ('General', 0) RETURNING id",
    )
    .fetch_one(pool)
    .await
    .expect("Failed to create test section");

    let (board_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_boards (section_id, title, description, req_level, sort_index) \
         VALUES ($1, 'Open board', 'For everyone', 0, 0) RETURNING id",
    )
    .bind(section_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create test board");

    let (restricted_board_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_boards (section_id, title, description, req_level, sort_index) \
         VALUES ($1, 'Staff board', 'Admins only', 2, 1) RETURNING id",
    )
    .bind(section_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create restricted board");

    let (thread_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_threads (board_id, user_id, title) \
         VALUES ($1, $2, 'Welcome thread') RETURNING id",
    )
    .bind(board_id)
    .bind(member_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create test thread");

    let (restricted_thread_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_threads (board_id, user_id, title) \
         VALUES ($1, $2, 'Staff thread') RETURNING id",
    )
    .bind(restricted_board_id)
    .bind(admin_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create restricted thread");

    let (post_id,): (i64,) = sqlx::query_as(
        "INSERT INTO forum_posts (thread_id, user_id, message) \
         VALUES ($1, $2, 'First post') RETURNING id",
    )
    .bind(thread_id)
    .bind(member_id)
    .fetch_one(pool)
    .await
    .expect("Failed to create test post");

    Seeded {
        member_id,
        admin_id,
        member_key,
        admin_key,
        section_id,
        board_id,
        restricted_board_id,
        thread_id,
        restricted_thread_id,
        post_id,
    }
}
