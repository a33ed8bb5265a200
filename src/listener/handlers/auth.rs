/**
 * Authentication Handler
 *
 * Operations under the `auth.` route: login, logout, session
 * re-authentication for reconnecting sockets, account registration and
 * profile updates.
 *
 * # Session Flow
 *
 * A successful login creates a durable session row and answers three ways
 * at once: a direct response carrying the fresh session key, a control
 * envelope teaching the socket service the connection's new key and level,
 * and an avoid-self broadcast announcing the user. All three ride the
 * outbound transaction, so they become visible together with the session
 * row or not at all.
 *
 * # Legacy Accounts
 *
 * Accounts migrated from the old site arrive without a bcrypt hash; their
 * first login is checked against the legacy SHA-256 bridge, which is then
 * replaced by a real credential and destroyed. The bridge works exactly
 * once.
 *
 * # Security
 *
 * - Unknown users and wrong passwords are indistinguishable (both 401)
 * - Passwords are never logged and never echoed back
 */
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::listener::db::{sessions, users};
use crate::listener::dispatch::{RouteNode, RouteTable};
use crate::listener::error::ListenerError;
use crate::listener::guards::{self, Guard};
use crate::listener::handlers::{req_str, HandlerContext};
use crate::listener::schema::{FieldSpec, FieldType, MessageSchema};
use crate::listener::session::{UserSession, LEVEL_GUEST, LEVEL_USER};
use crate::shared::envelope::{
    ControlMessage, FieldError, RequestEnvelope, ERR_NOT_FOUND, ERR_UNAUTHORIZED, ERR_VALIDATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Login,
    Logout,
    Authenticate,
    Register,
    UpdateProfile,
}

const ROUTES: RouteTable<Op> = RouteTable::new(&[
    ("login", RouteNode::Operation(Op::Login)),
    ("logout", RouteNode::Operation(Op::Logout)),
    ("authenticate", RouteNode::Operation(Op::Authenticate)),
    ("register", RouteNode::Operation(Op::Register)),
    ("update_profile", RouteNode::Operation(Op::UpdateProfile)),
]);

const LOGIN_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("username", FieldType::Text),
    FieldSpec::required("password", FieldType::Text),
]);

const AUTHENTICATE_SCHEMA: MessageSchema =
    MessageSchema::new(&[FieldSpec::required("session_key", FieldType::Text)]);

const REGISTER_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("username", FieldType::Text).length(4, 32),
    FieldSpec::required("password", FieldType::Text).length(8, 128),
    FieldSpec::required("nickname", FieldType::Text).length(2, 32),
]);

const UPDATE_PROFILE_SCHEMA: MessageSchema = MessageSchema::new(&[
    FieldSpec::required("nickname", FieldType::Text).length(2, 32),
    FieldSpec::optional("old_password", FieldType::Text),
    FieldSpec::optional("new_password", FieldType::Text)
        .length(8, 128)
        .requires("old_password"),
]);

const EMPTY_SCHEMA: MessageSchema = MessageSchema::new(&[]);

fn op_guards(op: Op) -> &'static [Guard] {
    match op {
        Op::Login => &[Guard::Schema(&LOGIN_SCHEMA)],
        Op::Logout => &[Guard::Authenticated, Guard::Schema(&EMPTY_SCHEMA)],
        Op::Authenticate => &[Guard::Schema(&AUTHENTICATE_SCHEMA)],
        Op::Register => &[Guard::Schema(&REGISTER_SCHEMA)],
        Op::UpdateProfile => &[Guard::Authenticated, Guard::Schema(&UPDATE_PROFILE_SCHEMA)],
    }
}

/// Dispatch an `auth.` route
pub async fn dispatch(
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    let (op, _rest) = match ROUTES.resolve(segments) {
        Ok(resolved) => resolved,
        Err(_) => {
            tracing::warn!(route = %ctx.route, "Unknown auth operation");
            return ctx.send_error_msg(ERR_NOT_FOUND, "Route not found").await;
        }
    };

    if let Err(rejection) = guards::check_all(op_guards(op), &ctx.session, &request.data) {
        return ctx.send_error(rejection.error_code, rejection.messages).await;
    }

    match op {
        Op::Login => login(ctx, &request.data).await,
        Op::Logout => logout(ctx).await,
        Op::Authenticate => authenticate(ctx, &request.data).await,
        Op::Register => register(ctx, &request.data).await,
        Op::UpdateProfile => update_profile(ctx, &request.data).await,
    }
}

async fn login(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let username = req_str(data, "username");
    let password = req_str(data, "password");

    let user = match users::get_active_by_username(&mut *ctx.tx, username).await? {
        Some(user) => user,
        None => {
            tracing::info!(username, "Login attempt for unknown user");
            return ctx
                .send_error_msg(ERR_UNAUTHORIZED, "Incorrect username or password")
                .await;
        }
    };

    let verified = match &user.password {
        Some(hash) => bcrypt::verify(password, hash)?,
        None => legacy_login(ctx, &user, password).await?,
    };
    if !verified {
        tracing::info!(username, "Login attempt with wrong password");
        return ctx
            .send_error_msg(ERR_UNAUTHORIZED, "Incorrect username or password")
            .await;
    }

    let session = sessions::create(&mut *ctx.tx, user.id).await?;
    tracing::info!(username, user_id = user.id, "User logged in");

    ctx.send_message(json!({
        "session_key": session.session_key,
        "user": user.public_view(),
    }))
    .await?;
    ctx.send_control(&ControlMessage {
        session_key: Some(session.session_key.clone()),
        level: user.level,
    })
    .await?;
    ctx.broadcast_message(json!({"user": user.public_view()}), true, LEVEL_GUEST)
        .await?;

    Ok(())
}

/// Try the one-shot legacy credential bridge for a passwordless account
///
/// On a digest match the offered password becomes the account's real
/// bcrypt credential and the bridge row is destroyed.
async fn legacy_login(
    ctx: &mut HandlerContext<'_, '_>,
    user: &users::User,
    password: &str,
) -> Result<bool, ListenerError> {
    let credential = match users::get_legacy_credential(&mut *ctx.tx, user.id).await? {
        Some(credential) => credential,
        None => return Ok(false),
    };

    let digest = Sha256::digest(password.as_bytes());
    let digest_hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    if digest_hex != credential.password_sha.to_lowercase() {
        return Ok(false);
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    users::update_password(&mut *ctx.tx, user.id, &hash).await?;
    users::delete_legacy_credential(&mut *ctx.tx, user.id).await?;
    tracing::info!(user_id = user.id, "Imported legacy credential");

    Ok(true)
}

async fn logout(ctx: &mut HandlerContext<'_, '_>) -> Result<(), ListenerError> {
    // The authenticated guard guarantees a user here
    let user_view = ctx
        .session
        .user()
        .map(|user| user.public_view())
        .unwrap_or(Value::Null);

    ctx.session.invalidate(&mut *ctx.tx).await?;
    tracing::info!("User logged out");

    ctx.send_message(json!({})).await?;
    ctx.send_control(&ControlMessage {
        session_key: None,
        level: LEVEL_GUEST,
    })
    .await?;
    ctx.broadcast_message(json!({"user": user_view}), true, LEVEL_GUEST)
        .await?;

    Ok(())
}

async fn authenticate(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let offered_key = req_str(data, "session_key");

    // Resolve the offered key rather than the connection's cached one; this
    // is how a reconnected socket re-binds to an existing session
    let session = UserSession::resolve(&mut *ctx.tx, Some(offered_key)).await?;
    let user = match session.user() {
        Some(user) => user.clone(),
        None => {
            return ctx
                .send_error_msg(ERR_UNAUTHORIZED, "Invalid session")
                .await;
        }
    };

    session.touch(&mut *ctx.tx).await;

    ctx.send_message(json!({
        "user": user.public_view(),
        "level": user.level,
    }))
    .await?;
    ctx.send_control(&ControlMessage {
        session_key: session.session_key().map(|key| key.to_string()),
        level: user.level,
    })
    .await?;

    Ok(())
}

async fn register(ctx: &mut HandlerContext<'_, '_>, data: &Value) -> Result<(), ListenerError> {
    let username = req_str(data, "username");
    let password = req_str(data, "password");
    let nickname = req_str(data, "nickname");

    if users::username_taken(&mut *ctx.tx, username).await? {
        return ctx
            .send_error(
                ERR_VALIDATION,
                vec![FieldError::field("username", "Username is already taken")],
            )
            .await;
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    let user = users::create(&mut *ctx.tx, username, nickname, &hash, LEVEL_USER).await?;
    tracing::info!(username, user_id = user.id, "User registered");

    ctx.send_message(json!({"user": user.public_view()})).await?;

    Ok(())
}

async fn update_profile(
    ctx: &mut HandlerContext<'_, '_>,
    data: &Value,
) -> Result<(), ListenerError> {
    let nickname = req_str(data, "nickname").to_string();
    let old_password = data["old_password"].as_str();
    let new_password = data["new_password"].as_str();

    // The authenticated guard guarantees a user here
    let user = match ctx.session.user() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };

    if let Some(new_password) = new_password {
        let current_hash = user.password.as_deref().unwrap_or_default();
        let old_ok = match old_password {
            Some(old_password) if !current_hash.is_empty() => {
                bcrypt::verify(old_password, current_hash)?
            }
            _ => false,
        };
        if !old_ok {
            return ctx
                .send_error(
                    ERR_VALIDATION,
                    vec![FieldError::field("old_password", "Incorrect password")],
                )
                .await;
        }
        let hash = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;
        users::update_password(&mut *ctx.tx, user.id, &hash).await?;
        tracing::info!(user_id = user.id, "Password changed");
    }

    users::update_nickname(&mut *ctx.tx, user.id, &nickname).await?;

    let updated = users::get_active_by_id(&mut *ctx.tx, user.id).await?;
    let view = updated
        .map(|user| user.public_view())
        .unwrap_or(Value::Null);
    ctx.send_message(json!({"user": view})).await?;

    Ok(())
}
