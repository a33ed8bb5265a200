/**
 * Request Router
 *
 * This module orchestrates one request's full lifecycle:
 *
 * ```text
 * Validating -> Dispatching -> Executing -> Committing | RollingBack -> Closed
 * ```
 *
 * # Lifecycle
 *
 * 1. **Validating** - the envelope body is shape-checked. A malformed
 *    request with a salvageable receipt is answered with a 400 published
 *    directly to the transport (no transaction has opened yet); without a
 *    receipt it is dropped with a log line.
 * 2. **Dispatching** - the leading route segment selects a handler from
 *    the static registry. Unknown leading segments are dropped silently:
 *    no legitimate client produces them, so they are noise, not a
 *    user-facing error.
 * 3. **Executing** - one storage transaction and one outbound-channel
 *    transaction are opened, the session is resolved against the open
 *    transaction, and the handler runs with the remaining segments.
 * 4. **Committing** - storage commits before the outbound flush, so a
 *    client can never observe a notification for a write that did not
 *    durably land.
 * 5. **RollingBack** - any error escaping the handler rolls back storage,
 *    discards the outbound buffer, and - only if the caller supplied a
 *    receipt - publishes a single 500 envelope directly to the transport,
 *    deliberately bypassing the channel that was just rolled back.
 * 6. **Closed** - the outbound channel is released unconditionally; the
 *    transaction handle is consumed by commit/rollback either way.
 */
use sqlx::{PgPool, Postgres, Transaction};

use crate::listener::error::ListenerError;
use crate::listener::handlers::{self, HandlerContext};
use crate::listener::outbound::OutboundChannel;
use crate::listener::session::UserSession;
use crate::shared::envelope::{
    response_body, DeliveryHead, ErrorBody, InboundEnvelope, Receipt, RequestEnvelope,
    TransportEnvelope, ERR_BAD_REQUEST, ERR_SERVER,
};
use crate::shared::mq::OutboundTransport;

/// Per-request orchestrator
///
/// Owns the connection pool; each request gets its own transaction and its
/// own outbound channel, handed to exactly one handler and never shared
/// with another in-flight request.
pub struct MessageRouter {
    pool: PgPool,
}

impl MessageRouter {
    /// Create a router over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run one consumed envelope through the full lifecycle
    ///
    /// # Errors
    ///
    /// Returns the unhandled fault after rollback and fault notification;
    /// the consumer uses this to reject the delivery. Expected outcomes -
    /// guard denials, validation failures, missing entities, malformed or
    /// unroutable envelopes - all return `Ok`.
    pub async fn handle(
        &self,
        transport: &dyn OutboundTransport,
        envelope: &InboundEnvelope,
    ) -> Result<(), ListenerError> {
        // Validating
        let request = match RequestEnvelope::parse(&envelope.body) {
            Ok(request) => request,
            Err(malformed) => {
                tracing::warn!(
                    connection_id = %envelope.head.connection_id,
                    reason = malformed.reason,
                    "Rejected malformed envelope"
                );
                if let Some(receipt) = &malformed.receipt {
                    publish_direct_error(
                        transport,
                        &envelope.head.connection_id,
                        malformed.route.as_deref().unwrap_or_default(),
                        receipt,
                        ERR_BAD_REQUEST,
                        "Malformed request",
                    )
                    .await;
                }
                return Ok(());
            }
        };

        // Dispatching
        let mut split = request.route.split('.');
        let handler = split.next().unwrap_or_default();
        let segments: Vec<&str> = split.collect();
        if !handlers::is_registered(handler) {
            tracing::warn!(route = %request.route, "No handler found for route");
            return Ok(());
        }
        tracing::info!(route = %request.route, handler, "Routing request");

        // Executing
        let mut tx = self.pool.begin().await?;
        let mut outbound = OutboundChannel::new(transport);
        outbound.begin();

        let result = execute(&mut tx, &mut outbound, envelope, &request, handler, &segments).await;

        // Committing | RollingBack
        let outcome = match result {
            Ok(()) => match tx.commit().await {
                Ok(()) => {
                    // Storage is durable; flush the buffered notifications.
                    // A failure here cannot be rolled back anymore, the
                    // notifications are simply lost.
                    outbound.commit().await.map_err(|e| {
                        tracing::error!(
                            route = %request.route,
                            "Outbound flush failed after storage commit: {:?}",
                            e
                        );
                        ListenerError::from(e)
                    })
                }
                Err(e) => {
                    outbound.rollback();
                    notify_fault(transport, envelope, &request).await;
                    tracing::error!(route = %request.route, "Storage commit failed: {:?}", e);
                    Err(ListenerError::from(e))
                }
            },
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!("Transaction rollback failed: {:?}", rollback_error);
                }
                outbound.rollback();
                notify_fault(transport, envelope, &request).await;
                tracing::error!(
                    route = %request.route,
                    "Unhandled fault while handling request: {:?}",
                    e
                );
                Err(e)
            }
        };

        // Closed
        outbound.close();
        outcome
    }
}

/// Resolve the session and run the selected handler
async fn execute(
    tx: &mut Transaction<'static, Postgres>,
    outbound: &mut OutboundChannel<'_>,
    envelope: &InboundEnvelope,
    request: &RequestEnvelope,
    handler: &str,
    segments: &[&str],
) -> Result<(), ListenerError> {
    let session = UserSession::resolve(&mut *tx, envelope.head.session_key.as_deref()).await?;
    session.touch(&mut *tx).await;

    let mut ctx = HandlerContext {
        tx,
        outbound,
        session,
        connection_id: envelope.head.connection_id.clone(),
        receipt: request.receipt.clone(),
        route: request.route.clone(),
    };
    handlers::dispatch(handler, &mut ctx, segments, request).await
}

/// Best-effort 500 to the caller after a rollback
///
/// Bypasses the outbound channel on purpose - it was just rolled back -
/// and stays silent when the request carried no receipt.
async fn notify_fault(
    transport: &dyn OutboundTransport,
    envelope: &InboundEnvelope,
    request: &RequestEnvelope,
) {
    if let Some(receipt) = &request.receipt {
        publish_direct_error(
            transport,
            &envelope.head.connection_id,
            &request.route,
            receipt,
            ERR_SERVER,
            "Server error",
        )
        .await;
    }
}

async fn publish_direct_error(
    transport: &dyn OutboundTransport,
    connection_id: &str,
    route: &str,
    receipt: &Receipt,
    error_code: u16,
    message: &str,
) {
    let error = ErrorBody::single(error_code, message);
    let data = match serde_json::to_value(error) {
        Ok(data) => data,
        Err(_) => return,
    };
    let direct = TransportEnvelope {
        head: DeliveryHead {
            connection_id: Some(connection_id.to_string()),
            broadcast: false,
            avoid_self: false,
            is_control: false,
            req_level: 0,
        },
        body: response_body(route, Some(receipt), true, data),
    };
    if let Err(e) = transport.publish(&direct).await {
        tracing::error!("Failed to publish direct error response: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::testing::RecordingTransport;
    use crate::shared::envelope::InboundHead;
    use serde_json::json;

    // A lazy pool never connects unless a query actually runs, which the
    // pre-transaction paths below never do
    fn router() -> MessageRouter {
        let pool = PgPool::connect_lazy("postgres://localhost/palaver_test")
            .expect("lazy pool construction cannot fail");
        MessageRouter::new(pool)
    }

    fn inbound(body: serde_json::Value) -> InboundEnvelope {
        InboundEnvelope {
            head: InboundHead {
                connection_id: "conn-1".to_string(),
                session_key: None,
            },
            body,
        }
    }

    #[tokio::test]
    async fn test_malformed_envelope_with_receipt_gets_direct_400() {
        let transport = RecordingTransport::new();
        let envelope = inbound(json!({"receipt": "r1", "data": {}}));

        router().handle(&transport, &envelope).await.unwrap();

        let published = transport.envelopes();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].head.connection_id.as_deref(), Some("conn-1"));
        assert!(!published[0].head.broadcast);
        assert_eq!(published[0].body["receipt"], json!("r1"));
        assert_eq!(published[0].body["error"], json!(true));
        assert_eq!(published[0].body["data"]["error_code"], json!(400));
    }

    #[tokio::test]
    async fn test_malformed_envelope_without_receipt_is_silent() {
        let transport = RecordingTransport::new();
        let envelope = inbound(json!("not an object"));

        router().handle(&transport, &envelope).await.unwrap();

        assert!(transport.envelopes().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_top_level_segment_is_silent() {
        let transport = RecordingTransport::new();
        // Valid shape, but no handler named "nonsense" exists; even with a
        // receipt this is dropped by design
        let envelope = inbound(json!({
            "route": "nonsense.op",
            "receipt": "r2",
            "data": {}
        }));

        router().handle(&transport, &envelope).await.unwrap();

        assert!(transport.envelopes().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_route_gets_direct_400() {
        let transport = RecordingTransport::new();
        let envelope = inbound(json!({
            "route": "f".repeat(64),
            "receipt": 3,
            "data": {}
        }));

        router().handle(&transport, &envelope).await.unwrap();

        let published = transport.envelopes();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].body["data"]["error_code"], json!(400));
        assert_eq!(published[0].body["receipt"], json!(3));
    }
}
