/**
 * Forum Handler
 *
 * Operations under the `forum.` route: reading sections, boards, threads
 * and posts, creating and editing content, and the admin-level structure
 * management.
 *
 * # Board Visibility
 *
 * Boards carry a minimum read level. Every path that reaches content
 * through a board checks it and answers 404 on failure, so a caller below
 * the level cannot tell a restricted board from a missing one. Admin
 * gating, by contrast, is an explicit 403 from the level guard.
 *
 * # Notifications
 *
 * New threads and posts broadcast to every other connected endpoint at the
 * board's read level, riding the outbound transaction together with the
 * row they announce.
 */
use std::collections::HashMap;

use serde_json::{json, Value};

use crate::listener::db::forum::{self, Board};
use crate::listener::db::users;
use crate::listener::dispatch::{RouteNode, RouteTable};
use crate::listener::error::ListenerError;
use crate::listener::guards::{self, Guard};
use crate::listener::handlers::{opt_bool, opt_str, paging, req_i64, req_str, HandlerContext};
use crate::listener::schema::{FieldSpec, FieldType, MessageSchema};
use crate::listener::session::{UserSession, LEVEL_ADMIN};
use crate::shared::envelope::{FieldError, RequestEnvelope, ERR_NOT_FOUND, ERR_VALIDATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    GetSections,
    GetBoards,
    GetCombinedBoards,
    GetThreads,
    GetPosts,
    GetPost,
    InsertThread,
    UpdateThread,
    InsertPost,
    UpdatePost,
    DeletePost,
    DeleteThread,
    InsertSection,
    UpdateSection,
    DeleteSection,
    InsertBoard,
    UpdateBoard,
    DeleteBoard,
}

const ROUTES: RouteTable<Op> = RouteTable::new(&[
    ("get_sections", RouteNode::Operation(Op::GetSections)),
    ("get_boards", RouteNode::Operation(Op::GetBoards)),
    (
        "get_combined_boards",
        RouteNode::Operation(Op::GetCombinedBoards),
    ),
    ("get_threads", RouteNode::Operation(Op::GetThreads)),
    ("get_posts", RouteNode::Operation(Op::GetPosts)),
    ("get_post", RouteNode::Operation(Op::GetPost)),
    ("insert_thread", RouteNode::Operation(Op::InsertThread)),
    ("update_thread", RouteNode::Operation(Op::UpdateThread)),
    ("insert_post", RouteNode::Operation(Op::InsertPost)),
    ("update_post", RouteNode::Operation(Op::UpdatePost)),
    ("delete_post", RouteNode::Operation(Op::DeletePost)),
    ("delete_thread", RouteNode::Operation(Op::DeleteThread)),
    ("insert_section", RouteNode::Operation(Op::InsertSection)),
    ("update_section", RouteNode::Operation(Op::UpdateSection)),
    ("delete_section", RouteNode::Operation(Op::DeleteSection)),
    ("insert_board", RouteNode::Operation(Op::InsertBoard)),
    ("update_board", RouteNode::Operation(Op::UpdateBoard)),
    ("delete_board", RouteNode::Operation(Op::DeleteBoard)),
]);

const EMPTY_SCHEMA: MessageSchema = MessageSchema::new(&[]);

const GET_BOARDS: MessageSchema =
    MessageSchema::new(&[FieldSpec::optional("section", FieldType::Integer)]);

const GET_THREADS: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("board", FieldType::Integer),
    FieldSpec::optional("start", FieldType::Integer).at_least(0),
    FieldSpec::optional("count", FieldType::Integer).at_least(1),
]);

const GET_POSTS: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("thread", FieldType::Integer),
    FieldSpec::optional("start", FieldType::Integer).at_least(0),
    FieldSpec::optional("count", FieldType::Integer).at_least(1),
]);

const GET_POST: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("post", FieldType::Integer)]);

const INSERT_THREAD: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("board", FieldType::Integer),
    FieldSpec::required("title", FieldType::Text).length(4, 64),
    FieldSpec::required("message", FieldType::Text).length(1, 65535),
    FieldSpec::optional("sticky", FieldType::Boolean),
    FieldSpec::optional("closed", FieldType::Boolean),
]);

const UPDATE_THREAD: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("thread", FieldType::Integer),
    FieldSpec::optional("title", FieldType::Text).length(4, 64),
    FieldSpec::optional("sticky", FieldType::Boolean),
    FieldSpec::optional("closed", FieldType::Boolean),
]);

const INSERT_POST: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("thread", FieldType::Integer),
    FieldSpec::required("message", FieldType::Text).length(1, 65535),
]);

const UPDATE_POST: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("post", FieldType::Integer),
    FieldSpec::required("message", FieldType::Text).length(1, 65535),
    FieldSpec::optional("edit_message", FieldType::Text).max_length(256),
]);

const POST_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("post", FieldType::Integer)]);

const THREAD_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("thread", FieldType::Integer)]);

const SECTION_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("section", FieldType::Integer)]);

const BOARD_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("board", FieldType::Integer)]);

const INSERT_SECTION: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("title", FieldType::Text).length(1, 64),
    FieldSpec::optional("sort_index", FieldType::Integer),
]);

const UPDATE_SECTION: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("section", FieldType::Integer),
    FieldSpec::optional("title", FieldType::Text).length(1, 64),
    FieldSpec::optional("sort_index", FieldType::Integer),
]);

const INSERT_BOARD: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("section", FieldType::Integer),
    FieldSpec::required("title", FieldType::Text).length(1, 64),
    FieldSpec::optional("description", FieldType::Text),
    FieldSpec::optional("req_level", FieldType::Integer).range(0, 2),
    FieldSpec::optional("sort_index", FieldType::Integer),
]);

const UPDATE_BOARD: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("board", FieldType::Integer),
    FieldSpec::optional("title", FieldType::Text).length(1, 64),
    FieldSpec::optional("description", FieldType::Text),
    FieldSpec::optional("req_level", FieldType::Integer).range(0, 2),
    FieldSpec::optional("sort_index", FieldType::Integer),
]);

fn op_guards(op: Op) -> &'static [Guard] {
    match op {
        Op::GetSections | Op::GetCombinedBoards => &[Guard::Schema(&EMPTY_SCHEMA)],
        Op::GetBoards => &[Guard::Schema(&GET_BOARDS)],
        Op::GetThreads => &[Guard::Schema(&GET_THREADS)],
        Op::GetPosts => &[Guard::Schema(&GET_POSTS)],
        Op::GetPost => &[Guard::Schema(&GET_POST)],
        Op::InsertThread => &[Guard::Authenticated, Guard::Schema(&INSERT_THREAD)],
        Op::UpdateThread => &[Guard::Authenticated, Guard::Schema(&UPDATE_THREAD)],
        Op::InsertPost => &[Guard::Authenticated, Guard::Schema(&INSERT_POST)],
        Op::UpdatePost => &[Guard::Authenticated, Guard::Schema(&UPDATE_POST)],
        Op::DeletePost => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&POST_REF)],
        Op::DeleteThread => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&THREAD_REF)],
        Op::InsertSection => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&INSERT_SECTION)],
        Op::UpdateSection => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&UPDATE_SECTION)],
        Op::DeleteSection => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&SECTION_REF)],
        Op::InsertBoard => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&INSERT_BOARD)],
        Op::UpdateBoard => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&UPDATE_BOARD)],
        Op::DeleteBoard => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&BOARD_REF)],
    }
}

/// Dispatch a `forum.` route
pub async fn dispatch(
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    let (op, _rest) = match ROUTES.resolve(segments) {
        Ok(resolved) => resolved,
        Err(_) => {
            tracing::warn!(route = %ctx.route, "Unknown forum operation");
            return ctx.send_error_msg(ERR_NOT_FOUND, "Route not found").await;
        }
    };

    if let Err(rejection) = guards::check_all(op_guards(op), &ctx.session, &request.data) {
        return ctx.send_error(rejection.error_code, rejection.messages).await;
    }

    match op {
        Op::GetSections => get_sections(ctx).await,
        Op::GetBoards => get_boards(ctx, &request.data).await,
        Op::GetCombinedBoards => get_combined_boards(ctx).await,
        Op::GetThreads => get_threads(ctx, &request.data).await,
        Op::GetPosts => get_posts(ctx, &request.data).await,
        Op::GetPost => get_post(ctx, &request.data).await,
        Op::InsertThread => insert_thread(ctx, &request.data).await,
        Op::UpdateThread => update_thread(ctx, &request.data).await,
        Op::InsertPost => insert_post(ctx, &request.data).await,
        Op::UpdatePost => update_post(ctx, &request.data).await,
        Op::DeletePost => delete_post(ctx, &request.data).await,
        Op::DeleteThread => delete_thread(ctx, &request.data).await,
        Op::InsertSection => insert_section(ctx, &request.data).await,
        Op::UpdateSection => update_section(ctx, &request.data).await,
        Op::DeleteSection => delete_section(ctx, &request.data).await,
        Op::InsertBoard => insert_board(ctx, &request.data).await,
        Op::UpdateBoard => update_board(ctx, &request.data).await,
        Op::DeleteBoard => delete_board(ctx, &request.data).await,
    }
}

/// Whether the caller may read through this board
fn can_read(session: &UserSession, board: &Board) -> bool {
    board.req_level <= session.level()
}

/// Add a post/thread author to the response's user map
async fn collect_user(
    ctx: &mut HandlerContext<'_, '_>,
    map: &mut HashMap<i64, Value>,
    user_id: i64,
) -> Result<(), ListenerError> {
    if let std::collections::hash_map::Entry::Vacant(entry) = map.entry(user_id) {
        if let Some(user) = users::get_active_by_id(&mut *ctx.tx, user_id).await? {
            entry.insert(user.public_view());
        }
    }
    Ok(())
}

async fn get_sections(ctx: &mut HandlerContext<'_, '_>) -> Result<(), ListenerError> {
    let sections = forum::sections_visible(&mut *ctx.tx, ctx.session.level()).await?;
    let out: Vec<Value> = sections.iter().map(|s| s.view()).collect();
    ctx.send_message(json!({"sections": out})).await
}

async fn get_boards(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let section_id = data["section"].as_i64();
    let boards = forum::boards_visible(&mut *ctx.tx, ctx.session.level(), section_id).await?;
    let out: Vec<Value> = boards.iter().map(|b| b.view()).collect();
    ctx.send_message(json!({"boards": out})).await
}

async fn get_combined_boards(ctx: &mut HandlerContext<'_, '_>) -> Result<(), ListenerError> {
    let level = ctx.session.level();
    let sections = forum::sections_visible(&mut *ctx.tx, level).await?;

    let mut out = Vec::with_capacity(sections.len());
    for section in &sections {
        let boards = forum::boards_visible(&mut *ctx.tx, level, Some(section.id)).await?;
        let mut view = section.view();
        view["boards"] = json!(boards.iter().map(|b| b.view()).collect::<Vec<_>>());
        out.push(view);
    }
    ctx.send_message(json!({"sections": out})).await
}

async fn get_threads(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let board_id = req_i64(data, "board");
    let (start, count) = paging(data);

    // Level gating hides the board's existence entirely
    let board = match forum::get_board(&mut *ctx.tx, board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Board not found").await,
    };

    let threads_count = forum::count_threads(&mut *ctx.tx, board.id).await?;
    let threads = forum::threads_for_board(&mut *ctx.tx, board.id, start, count).await?;

    let caller_id = ctx.session.user().map(|user| user.id);
    let mut users_map = HashMap::new();
    let mut thread_list = Vec::with_capacity(threads.len());
    for thread in &threads {
        collect_user(ctx, &mut users_map, thread.user_id).await?;

        let mut view = thread.view();
        view["last_read"] = match caller_id {
            Some(user_id) => forum::last_read_at(&mut *ctx.tx, thread.id, user_id)
                .await?
                .map(|at| json!(at.to_rfc3339()))
                .unwrap_or(Value::Null),
            None => Value::Null,
        };
        thread_list.push(view);
    }

    ctx.send_message(json!({
        "board": board.view(),
        "threads_count": threads_count,
        "threads": thread_list,
        "users": users_map,
    }))
    .await
}

async fn get_posts(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let thread_id = req_i64(data, "thread");
    let (start, count) = paging(data);

    let thread = match forum::get_thread(&mut *ctx.tx, thread_id).await? {
        Some(thread) => thread,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };
    let board = match forum::get_board(&mut *ctx.tx, thread.board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };

    let posts_count = forum::count_posts(&mut *ctx.tx, thread.id).await?;
    let posts = forum::posts_for_thread(&mut *ctx.tx, thread.id, start, count).await?;

    let mut users_map = HashMap::new();
    let mut post_list = Vec::with_capacity(posts.len());
    for post in &posts {
        collect_user(ctx, &mut users_map, post.user_id).await?;

        let mut view = post.view();
        let mut edit_views = Vec::new();
        for edit in forum::edits_for_post(&mut *ctx.tx, post.id).await? {
            collect_user(ctx, &mut users_map, edit.user_id).await?;
            edit_views.push(edit.view());
        }
        view["edits"] = json!(edit_views);
        post_list.push(view);
    }

    // Reading a thread marks it read for the caller
    if let Some(user) = ctx.session.user() {
        forum::mark_read(&mut *ctx.tx, thread.id, user.id).await?;
    }

    ctx.send_message(json!({
        "board": board.view(),
        "thread": thread.view(),
        "posts_count": posts_count,
        "posts": post_list,
        "users": users_map,
    }))
    .await
}

async fn get_post(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");

    let post = match forum::get_post(&mut *ctx.tx, post_id).await? {
        Some(post) => post,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };
    let thread = match forum::get_thread(&mut *ctx.tx, post.thread_id).await? {
        Some(thread) => thread,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };
    let board = match forum::get_board(&mut *ctx.tx, thread.board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };

    let mut users_map = HashMap::new();
    collect_user(ctx, &mut users_map, post.user_id).await?;

    let mut post_view = post.view();
    let mut edit_views = Vec::new();
    for edit in forum::edits_for_post(&mut *ctx.tx, post.id).await? {
        collect_user(ctx, &mut users_map, edit.user_id).await?;
        edit_views.push(edit.view());
    }
    post_view["edits"] = json!(edit_views);

    ctx.send_message(json!({
        "board": board.view(),
        "thread": thread.view(),
        "post": post_view,
        "users": users_map,
    }))
    .await
}

async fn insert_thread(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let board_id = req_i64(data, "board");
    let title = req_str(data, "title").to_string();
    let message = req_str(data, "message").to_string();
    let sticky = opt_bool(data, "sticky").unwrap_or(false);
    let closed = opt_bool(data, "closed").unwrap_or(false);

    let board = match forum::get_board(&mut *ctx.tx, board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Board not found").await,
    };

    let user = match ctx.session.user() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    let thread = forum::insert_thread(&mut *ctx.tx, board.id, user.id, &title, sticky, closed).await?;
    let post = forum::insert_post(&mut *ctx.tx, thread.id, user.id, &message).await?;
    tracing::info!(thread_id = thread.id, board_id = board.id, "Thread created");

    let payload = json!({
        "thread": thread.view(),
        "post": post.view(),
        "user": user.public_view(),
    });
    ctx.send_message(payload.clone()).await?;
    ctx.broadcast_message(payload, true, board.req_level).await?;

    Ok(())
}

async fn update_thread(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let thread_id = req_i64(data, "thread");
    let title = opt_str(data, "title").map(|t| t.to_string());
    let sticky = opt_bool(data, "sticky");
    let closed = opt_bool(data, "closed");

    let user = match ctx.session.user() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    // Only the thread's owner may edit it; everything else looks missing
    let thread = match forum::get_thread(&mut *ctx.tx, thread_id).await? {
        Some(thread) if thread.user_id == user.id => thread,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };
    match forum::get_board(&mut *ctx.tx, thread.board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };

    let thread =
        forum::update_thread(&mut *ctx.tx, thread.id, title.as_deref(), sticky, closed).await?;

    ctx.send_message(json!({
        "thread": thread.view(),
        "user": user.public_view(),
    }))
    .await
}

async fn insert_post(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let thread_id = req_i64(data, "thread");
    let message = req_str(data, "message").to_string();

    let thread = match forum::get_thread(&mut *ctx.tx, thread_id).await? {
        Some(thread) => thread,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };
    let board = match forum::get_board(&mut *ctx.tx, thread.board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };
    if thread.closed {
        return ctx
            .send_error(
                ERR_VALIDATION,
                vec![FieldError::field("thread", "Thread is closed")],
            )
            .await;
    }

    let user = match ctx.session.user() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    let post = forum::insert_post(&mut *ctx.tx, thread.id, user.id, &message).await?;
    forum::touch_thread(&mut *ctx.tx, thread.id).await?;
    tracing::info!(post_id = post.id, thread_id = thread.id, "Post created");

    let payload = json!({
        "thread": thread.view(),
        "post": post.view(),
        "user": user.public_view(),
    });
    ctx.send_message(payload.clone()).await?;
    ctx.broadcast_message(payload, true, board.req_level).await?;

    Ok(())
}

async fn update_post(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");
    let message = req_str(data, "message").to_string();
    let edit_message = opt_str(data, "edit_message").map(|m| m.to_string());

    let user = match ctx.session.user() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    // Only the post's owner may edit it; everything else looks missing
    let post = match forum::get_post(&mut *ctx.tx, post_id).await? {
        Some(post) if post.user_id == user.id => post,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };
    let thread = match forum::get_thread(&mut *ctx.tx, post.thread_id).await? {
        Some(thread) => thread,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };
    match forum::get_board(&mut *ctx.tx, thread.board_id).await? {
        Some(board) if can_read(&ctx.session, &board) => board,
        _ => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };

    let post = forum::update_post_message(&mut *ctx.tx, post.id, &message).await?;

    let mut payload = json!({
        "thread": thread.view(),
        "post": post.view(),
        "user": user.public_view(),
    });
    if let Some(edit_message) = edit_message {
        let edit = forum::insert_post_edit(&mut *ctx.tx, post.id, user.id, &edit_message).await?;
        payload["edit"] = edit.view();
    }

    ctx.send_message(payload).await
}

async fn delete_post(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");

    match forum::get_post(&mut *ctx.tx, post_id).await? {
        Some(post) => post,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Post not found").await,
    };
    forum::soft_delete_post(&mut *ctx.tx, post_id).await?;
    tracing::info!(post_id, "Post deleted");

    ctx.send_message(json!({})).await
}

async fn delete_thread(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let thread_id = req_i64(data, "thread");

    match forum::get_thread(&mut *ctx.tx, thread_id).await? {
        Some(thread) => thread,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Thread not found").await,
    };
    forum::soft_delete_thread(&mut *ctx.tx, thread_id).await?;
    tracing::info!(thread_id, "Thread deleted");

    ctx.send_message(json!({})).await
}

async fn insert_section(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let title = req_str(data, "title").to_string();
    let sort_index = opt_i64_as_i32(data, "sort_index").unwrap_or(0);

    let section = forum::insert_section(&mut *ctx.tx, &title, sort_index).await?;
    ctx.send_message(json!({"section": section.view()})).await
}

async fn update_section(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let section_id = req_i64(data, "section");
    let title = opt_str(data, "title").map(|t| t.to_string());
    let sort_index = opt_i64_as_i32(data, "sort_index");

    match forum::get_section(&mut *ctx.tx, section_id).await? {
        Some(section) => section,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Section not found").await,
    };
    let section =
        forum::update_section(&mut *ctx.tx, section_id, title.as_deref(), sort_index).await?;

    ctx.send_message(json!({"section": section.view()})).await
}

async fn delete_section(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let section_id = req_i64(data, "section");

    match forum::get_section(&mut *ctx.tx, section_id).await? {
        Some(section) => section,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Section not found").await,
    };
    forum::soft_delete_section(&mut *ctx.tx, section_id).await?;
    tracing::info!(section_id, "Section deleted");

    ctx.send_message(json!({})).await
}

async fn insert_board(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let section_id = req_i64(data, "section");
    let title = req_str(data, "title").to_string();
    let description = opt_str(data, "description").unwrap_or_default().to_string();
    let req_level = opt_i64_as_i32(data, "req_level").unwrap_or(0);
    let sort_index = opt_i64_as_i32(data, "sort_index").unwrap_or(0);

    match forum::get_section(&mut *ctx.tx, section_id).await? {
        Some(section) => section,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Section not found").await,
    };
    let board = forum::insert_board(
        &mut *ctx.tx,
        section_id,
        &title,
        &description,
        req_level,
        sort_index,
    )
    .await?;

    ctx.send_message(json!({"board": board.view()})).await
}

async fn update_board(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let board_id = req_i64(data, "board");
    let title = opt_str(data, "title").map(|t| t.to_string());
    let description = opt_str(data, "description").map(|d| d.to_string());
    let req_level = opt_i64_as_i32(data, "req_level");
    let sort_index = opt_i64_as_i32(data, "sort_index");

    match forum::get_board(&mut *ctx.tx, board_id).await? {
        Some(board) => board,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Board not found").await,
    };
    let board = forum::update_board(
        &mut *ctx.tx,
        board_id,
        title.as_deref(),
        description.as_deref(),
        req_level,
        sort_index,
    )
    .await?;

    ctx.send_message(json!({"board": board.view()})).await
}

async fn delete_board(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let board_id = req_i64(data, "board");

    match forum::get_board(&mut *ctx.tx, board_id).await? {
        Some(board) => board,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "Board not found").await,
    };
    forum::soft_delete_board(&mut *ctx.tx, board_id).await?;
    tracing::info!(board_id, "Board deleted");

    ctx.send_message(json!({})).await
}

fn opt_i64_as_i32(data: &Value, field: &str) -> Option<i32> {
    data[field].as_i64().map(|v| v as i32)
}
