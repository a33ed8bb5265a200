/**
 * News Handler
 *
 * Operations under the `news.` route. Reads are public - the site front
 * page consumes them anonymously - while publishing, editing and deleting
 * are admin operations. A newly published item is broadcast to every other
 * connected endpoint so open front pages refresh live.
 */
use serde_json::{json, Value};

use crate::listener::db::news;
use crate::listener::dispatch::{RouteNode, RouteTable};
use crate::listener::error::ListenerError;
use crate::listener::guards::{self, Guard};
use crate::listener::handlers::{opt_str, paging, req_i64, req_str, HandlerContext};
use crate::listener::schema::{FieldSpec, FieldType, MessageSchema};
use crate::listener::session::{LEVEL_ADMIN, LEVEL_GUEST};
use crate::shared::envelope::{RequestEnvelope, ERR_NOT_FOUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    GetNewsPosts,
    GetNewsPost,
    InsertNewsPost,
    UpdateNewsPost,
    DeleteNewsPost,
}

const ROUTES: RouteTable<Op> = RouteTable::new(&[
    ("get_news_posts", RouteNode::Operation(Op::GetNewsPosts)),
    ("get_news_post", RouteNode::Operation(Op::GetNewsPost)),
    ("insert_news_post", RouteNode::Operation(Op::InsertNewsPost)),
    ("update_news_post", RouteNode::Operation(Op::UpdateNewsPost)),
    ("delete_news_post", RouteNode::Operation(Op::DeleteNewsPost)),
]);

const LIST_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::optional("start", FieldType::Integer).at_least(0),
    FieldSpec::optional("count", FieldType::Integer).at_least(1),
]);

const POST_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("post", FieldType::Integer)]);

const INSERT_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("header", FieldType::Text).length(1, 128),
    FieldSpec::required("message", FieldType::Text).length(1, 16384),
]);

const UPDATE_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("post", FieldType::Integer),
    FieldSpec::optional("header", FieldType::Text).length(1, 128),
    FieldSpec::optional("message", FieldType::Text).length(1, 16384),
]);

fn op_guards(op: Op) -> &'static [Guard] {
    match op {
        Op::GetNewsPosts => &[Guard::Schema(&LIST_SCHEMA)],
        Op::GetNewsPost => &[Guard::Schema(&POST_REF)],
        Op::InsertNewsPost => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&INSERT_SCHEMA)],
        Op::UpdateNewsPost => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&UPDATE_SCHEMA)],
        Op::DeleteNewsPost => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&POST_REF)],
    }
}

/// Dispatch a `news.` route
pub async fn dispatch(
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    let (op, _rest) = match ROUTES.resolve(segments) {
        Ok(resolved) => resolved,
        Err(_) => {
            tracing::warn!(route = %ctx.route, "Unknown news operation");
            return ctx.send_error_msg(ERR_NOT_FOUND, "Route not found").await;
        }
    };

    if let Err(rejection) = guards::check_all(op_guards(op), &ctx.session, &request.data) {
        return ctx.send_error(rejection.error_code, rejection.messages).await;
    }

    match op {
        Op::GetNewsPosts => get_news_posts(ctx, &request.data).await,
        Op::GetNewsPost => get_news_post(ctx, &request.data).await,
        Op::InsertNewsPost => insert_news_post(ctx, &request.data).await,
        Op::UpdateNewsPost => update_news_post(ctx, &request.data).await,
        Op::DeleteNewsPost => delete_news_post(ctx, &request.data).await,
    }
}

async fn get_news_posts(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let (start, count) = paging(data);

    let news_count = news::count(&mut *ctx.tx).await?;
    let posts = news::list(&mut *ctx.tx, start, count).await?;
    let out: Vec<Value> = posts.iter().map(|p| p.view()).collect();

    ctx.send_message(json!({
        "news_count": news_count,
        "posts": out,
    }))
    .await
}

async fn get_news_post(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");

    let post = match news::get(&mut *ctx.tx, post_id).await? {
        Some(post) => post,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "News item not found").await,
    };

    ctx.send_message(json!({"post": post.view()})).await
}

async fn insert_news_post(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let header = req_str(data, "header").to_string();
    let message = req_str(data, "message").to_string();

    // The level guard guarantees an admin user here
    let nickname = ctx
        .session
        .user()
        .map(|user| user.nickname.clone())
        .unwrap_or_default();

    let post = news::insert(&mut *ctx.tx, &nickname, &header, &message).await?;
    tracing::info!(post_id = post.id, "News item published");

    ctx.send_message(json!({"post": post.view()})).await?;
    ctx.broadcast_message(json!({"post": post.view()}), true, LEVEL_GUEST)
        .await?;

    Ok(())
}

async fn update_news_post(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");
    let header = opt_str(data, "header").map(|h| h.to_string());
    let message = opt_str(data, "message").map(|m| m.to_string());

    match news::get(&mut *ctx.tx, post_id).await? {
        Some(post) => post,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "News item not found").await,
    };
    let post = news::update(&mut *ctx.tx, post_id, header.as_deref(), message.as_deref()).await?;

    ctx.send_message(json!({"post": post.view()})).await
}

async fn delete_news_post(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let post_id = req_i64(data, "post");

    match news::get(&mut *ctx.tx, post_id).await? {
        Some(post) => post,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "News item not found").await,
    };
    news::soft_delete(&mut *ctx.tx, post_id).await?;
    tracing::info!(post_id, "News item deleted");

    ctx.send_message(json!({})).await
}
