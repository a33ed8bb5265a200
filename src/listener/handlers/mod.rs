/**
 * Request Handlers
 *
 * This module defines the handler context - the bundle of request-scoped
 * resources every operation works through - and the static registry that
 * maps a route's leading segment to its handler module.
 *
 * # Handler Contract
 *
 * A handler is constructed per request with the open storage transaction,
 * the transactional outbound channel, the caller's resolved session, the
 * originating connection id, the optional receipt and the full route
 * string. It exposes a route table consulted with the remaining route
 * segments; operations answer through the context's send/broadcast
 * helpers, which enqueue into the outbound transaction so nothing escapes
 * if the request later fails.
 */
use serde_json::Value;
use sqlx::{Postgres, Transaction};

use crate::listener::error::ListenerError;
use crate::listener::outbound::OutboundChannel;
use crate::listener::session::UserSession;
use crate::shared::envelope::{
    response_body, ControlMessage, DeliveryHead, ErrorBody, FieldError, Receipt, RequestEnvelope,
};

/// Authentication: login, logout, register, profile
pub mod auth;

/// Forum: sections, boards, threads, posts
pub mod forum;

/// News items
pub mod news;

/// Administration: user management
pub mod admin;

/// Liveness ping
pub mod ping;

/// Whether a leading route segment has a registered handler
///
/// The router checks this before opening any transaction; unknown leading
/// segments are dropped silently.
pub fn is_registered(segment: &str) -> bool {
    matches!(segment, "auth" | "forum" | "news" | "admin" | "ping")
}

/// Dispatch the remaining route segments to the selected handler
pub async fn dispatch(
    segment: &str,
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    match segment {
        "auth" => auth::dispatch(ctx, segments, request).await,
        "forum" => forum::dispatch(ctx, segments, request).await,
        "news" => news::dispatch(ctx, segments, request).await,
        "admin" => admin::dispatch(ctx, segments, request).await,
        "ping" => ping::dispatch(ctx, segments, request).await,
        // The router only dispatches registered segments
        _ => Ok(()),
    }
}

/// Request-scoped resources handed to exactly one handler
pub struct HandlerContext<'a, 'b> {
    /// The open storage transaction; all queries run on this
    pub tx: &'a mut Transaction<'static, Postgres>,
    /// The open outbound-channel transaction; all sends buffer into this
    pub outbound: &'a mut OutboundChannel<'b>,
    /// The caller's resolved session
    pub session: UserSession,
    /// Originating WebSocket connection
    pub connection_id: String,
    /// Correlation id to echo back, when the caller supplied one
    pub receipt: Option<Receipt>,
    /// The full original route string
    pub route: String,
}

impl HandlerContext<'_, '_> {
    /// Send a success payload back to the caller
    pub async fn send_message(&mut self, data: Value) -> Result<(), ListenerError> {
        let body = response_body(&self.route, self.receipt.as_ref(), false, data);
        let head = self.reply_head(false);
        self.outbound.publish(head, body).await?;
        Ok(())
    }

    /// Send an error payload back to the caller
    pub async fn send_error(
        &mut self,
        error_code: u16,
        error_messages: Vec<FieldError>,
    ) -> Result<(), ListenerError> {
        let error = ErrorBody {
            error_code,
            error_messages,
        };
        let body = response_body(
            &self.route,
            self.receipt.as_ref(),
            true,
            serde_json::to_value(error)?,
        );
        let head = self.reply_head(false);
        self.outbound.publish(head, body).await?;
        Ok(())
    }

    /// Send an error with a single general message
    pub async fn send_error_msg(
        &mut self,
        error_code: u16,
        message: &str,
    ) -> Result<(), ListenerError> {
        self.send_error(error_code, vec![FieldError::general(message)])
            .await
    }

    /// Send session state to the caller's socket endpoint
    ///
    /// Control envelopes never carry a receipt; they are consumed by the
    /// socket service, not the client.
    pub async fn send_control(&mut self, control: &ControlMessage) -> Result<(), ListenerError> {
        let head = self.reply_head(true);
        self.outbound
            .publish(head, serde_json::to_value(control)?)
            .await?;
        Ok(())
    }

    /// Broadcast a payload to every sufficiently privileged endpoint
    pub async fn broadcast_message(
        &mut self,
        data: Value,
        avoid_self: bool,
        req_level: i32,
    ) -> Result<(), ListenerError> {
        let body = response_body(&self.route, None, false, data);
        let head = DeliveryHead {
            connection_id: Some(self.connection_id.clone()),
            broadcast: true,
            avoid_self,
            is_control: false,
            req_level,
        };
        self.outbound.publish(head, body).await?;
        Ok(())
    }

    fn reply_head(&self, is_control: bool) -> DeliveryHead {
        DeliveryHead {
            connection_id: Some(self.connection_id.clone()),
            broadcast: false,
            avoid_self: false,
            is_control,
            req_level: 0,
        }
    }
}

/// Required string field of a validated payload
pub fn req_str<'v>(data: &'v Value, field: &str) -> &'v str {
    data[field].as_str().unwrap_or_default()
}

/// Optional string field of a validated payload
///
/// Empty strings count as absent.
pub fn opt_str<'v>(data: &'v Value, field: &str) -> Option<&'v str> {
    data[field].as_str().filter(|s| !s.is_empty())
}

/// Required integer field of a validated payload
pub fn req_i64(data: &Value, field: &str) -> i64 {
    data[field].as_i64().unwrap_or_default()
}

/// Optional integer field of a validated payload
pub fn opt_i64(data: &Value, field: &str) -> Option<i64> {
    data[field].as_i64()
}

/// Optional boolean field of a validated payload
pub fn opt_bool(data: &Value, field: &str) -> Option<bool> {
    data[field].as_bool()
}

/// Pagination window from optional `start` and `count` fields
pub fn paging(data: &Value) -> (i64, Option<i64>) {
    (
        opt_i64(data, "start").unwrap_or(0),
        opt_i64(data, "count"),
    )
}
