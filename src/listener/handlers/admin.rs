/**
 * Administration Handler
 *
 * Operations under the `admin.` route. User management lives in a nested
 * `users` subtree (`admin.users.delete`, `admin.users.set_level`), so this
 * handler also exercises multi-level route resolution.
 *
 * Unlike the forum's read-path gating, admin operations answer an explicit
 * 403 to unprivileged callers; there is nothing to info-hide about routes
 * whose names are public anyway.
 */
use serde_json::{json, Value};

use crate::listener::db::{sessions, users};
use crate::listener::dispatch::{RouteNode, RouteTable};
use crate::listener::error::ListenerError;
use crate::listener::guards::{self, Guard};
use crate::listener::handlers::{paging, req_i64, HandlerContext};
use crate::listener::schema::{FieldSpec, FieldType, MessageSchema};
use crate::listener::session::{LEVEL_ADMIN, LEVEL_GUEST};
use crate::shared::envelope::{RequestEnvelope, ERR_NOT_FOUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    GetUsers,
    DeleteUser,
    SetUserLevel,
}

const ROUTES: RouteTable<Op> = RouteTable::new(&[
    ("get_users", RouteNode::Operation(Op::GetUsers)),
    (
        "users",
        RouteNode::SubRoutes(&[
            ("delete", RouteNode::Operation(Op::DeleteUser)),
            ("set_level", RouteNode::Operation(Op::SetUserLevel)),
        ]),
    ),
]);

const GET_USERS_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::optional("include_deleted", FieldType::Boolean),
    FieldSpec::optional("start", FieldType::Integer).at_least(0),
    FieldSpec::optional("count", FieldType::Integer).at_least(1),
]);

const USER_REF: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("user", FieldType::Integer)]);

const SET_LEVEL_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("user", FieldType::Integer),
    FieldSpec::required("level", FieldType::Integer).range(LEVEL_GUEST as i64, LEVEL_ADMIN as i64),
]);

fn op_guards(op: Op) -> &'static [Guard] {
    match op {
        Op::GetUsers => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&GET_USERS_SCHEMA)],
        Op::DeleteUser => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&USER_REF)],
        Op::SetUserLevel => &[Guard::Level(LEVEL_ADMIN), Guard::Schema(&SET_LEVEL_SCHEMA)],
    }
}

/// Dispatch an `admin.` route
pub async fn dispatch(
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    let (op, _rest) = match ROUTES.resolve(segments) {
        Ok(resolved) => resolved,
        Err(_) => {
            tracing::warn!(route = %ctx.route, "Unknown admin operation");
            return ctx.send_error_msg(ERR_NOT_FOUND, "Route not found").await;
        }
    };

    if let Err(rejection) = guards::check_all(op_guards(op), &ctx.session, &request.data) {
        return ctx.send_error(rejection.error_code, rejection.messages).await;
    }

    match op {
        Op::GetUsers => get_users(ctx, &request.data).await,
        Op::DeleteUser => delete_user(ctx, &request.data).await,
        Op::SetUserLevel => set_user_level(ctx, &request.data).await,
    }
}

async fn get_users(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let include_deleted = data["include_deleted"].as_bool().unwrap_or(false);
    let (start, count) = paging(data);

    let users_count = users::count(&mut *ctx.tx, include_deleted).await?;
    let user_rows = users::list(&mut *ctx.tx, include_deleted, start, count).await?;
    let out: Vec<Value> = user_rows.iter().map(|u| u.admin_view()).collect();

    ctx.send_message(json!({
        "users_count": users_count,
        "users": out,
    }))
    .await
}

async fn delete_user(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let user_id = req_i64(data, "user");

    if !users::soft_delete(&mut *ctx.tx, user_id).await? {
        return ctx.send_error_msg(ERR_NOT_FOUND, "User not found").await;
    }
    // Destroy the user's sessions now instead of waiting for the resolvers'
    // orphan cleanup to catch them one by one
    sessions::delete_for_user(&mut *ctx.tx, user_id).await?;
    tracing::info!(user_id, "User deleted");

    ctx.send_message(json!({})).await
}

async fn set_user_level(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let user_id = req_i64(data, "user");
    let level = req_i64(data, "level") as i32;

    match users::get_active_by_id(&mut *ctx.tx, user_id).await? {
        Some(user) => user,
        None => return ctx.send_error_msg(ERR_NOT_FOUND, "User not found").await,
    };
    users::set_level(&mut *ctx.tx, user_id, level).await?;
    tracing::info!(user_id, level, "User level changed");

    let updated = users::get_active_by_id(&mut *ctx.tx, user_id).await?;
    let view = updated.map(|user| user.admin_view()).unwrap_or(Value::Null);
    ctx.send_message(json!({"user": view})).await
}
