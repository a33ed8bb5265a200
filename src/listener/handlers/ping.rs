/**
 * Ping Handler
 *
 * The minimal liveness operation: a logged-in client sends `ping` and gets
 * a pong back through the full pipeline, which makes it a cheap end-to-end
 * probe of the broker, the router and the session machinery.
 */
use serde_json::json;

use crate::listener::error::ListenerError;
use crate::listener::guards::{self, Guard};
use crate::listener::handlers::HandlerContext;
use crate::listener::session::LEVEL_USER;
use crate::shared::envelope::{RequestEnvelope, ERR_NOT_FOUND};

const GUARDS: &[Guard] = &[Guard::Level(LEVEL_USER)];

/// Dispatch the `ping` route
///
/// `ping` is terminal; any further segments are unknown sub-routes.
pub async fn dispatch(
    ctx: &mut HandlerContext<'_, '_>,
    segments: &[&str],
    request: &RequestEnvelope,
) -> Result<(), ListenerError> {
    if !segments.is_empty() {
        tracing::warn!(route = %ctx.route, "Unknown ping operation");
        return ctx.send_error_msg(ERR_NOT_FOUND, "Route not found").await;
    }

    if let Err(rejection) = guards::check_all(GUARDS, &ctx.session, &request.data) {
        return ctx.send_error(rejection.error_code, rejection.messages).await;
    }

    ctx.send_message(json!({"ping": "pong"})).await
}
