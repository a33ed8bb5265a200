/**
 * Broadcast Fanout
 *
 * This module consumes outbound envelopes from the broker and delivers
 * them to connected endpoints according to their head flags:
 *
 * - non-broadcast: delivered to the single endpoint matching
 *   `connection_id`, if it is connected and its cached level meets
 *   `req_level`; otherwise dropped silently - a disconnected or
 *   ineligible recipient never errors the sender
 * - broadcast: delivered to every connected endpoint, skipping the origin
 *   when `avoid_self` is set and every endpoint below `req_level`
 * - control envelopes update the endpoint's cached session state instead
 *   of being forwarded to the client
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tokio::time::timeout;

use crate::shared::config::BrokerConfig;
use crate::shared::envelope::{ControlMessage, TransportEnvelope};
use crate::shared::mq::MqConnection;
use crate::socket::registry::ConnectionRegistry;

/// How long a single poll waits before re-checking the stop flag
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between reconnection attempts after a broker failure
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Deliver one outbound envelope to the eligible endpoints
pub async fn deliver(registry: &ConnectionRegistry, envelope: &TransportEnvelope) {
    let head = &envelope.head;

    if head.is_control {
        let control: ControlMessage = match serde_json::from_value(envelope.body.clone()) {
            Ok(control) => control,
            Err(e) => {
                tracing::warn!("Dropping undecodable control envelope: {:?}", e);
                return;
            }
        };
        if head.broadcast {
            let skip = head.avoid_self.then(|| head.connection_id.as_deref()).flatten();
            for (connection_id, _) in registry.broadcast_targets(skip, head.req_level).await {
                registry.apply_control(&connection_id, &control).await;
            }
        } else if let Some(connection_id) = &head.connection_id {
            registry.apply_control(connection_id, &control).await;
        }
        return;
    }

    let text = match serde_json::to_string(&envelope.body) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Dropping unserializable outbound body: {:?}", e);
            return;
        }
    };

    if head.broadcast {
        let skip = head.avoid_self.then(|| head.connection_id.as_deref()).flatten();
        let targets = registry.broadcast_targets(skip, head.req_level).await;
        tracing::debug!(recipients = targets.len(), "Broadcasting message");
        for (connection_id, sender) in targets {
            if sender.send(text.clone()).is_err() {
                tracing::debug!(%connection_id, "Endpoint writer is gone");
            }
        }
    } else if let Some(connection_id) = &head.connection_id {
        registry.send_to(connection_id, head.req_level, &text).await;
    } else {
        tracing::warn!("Dropping non-broadcast envelope without a target");
    }
}

/// Consume the socket queue and fan deliveries out until stopped
///
/// Mirrors the listener's consume loop: one envelope at a time,
/// acknowledge after delivery, reject undecodable payloads without
/// requeue, reconnect with a fixed backoff on broker failures.
pub async fn run(registry: Arc<ConnectionRegistry>, broker: BrokerConfig, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match MqConnection::connect_socket(&broker).await {
            Ok(mq) => {
                if let Err(e) = listen(&registry, &mq, &stop).await {
                    tracing::error!("Broker connection lost: {:?}", e);
                }
                if let Err(e) = mq.close().await {
                    tracing::debug!("Broker close failed: {:?}", e);
                }
            }
            Err(e) => {
                tracing::error!("Failed to connect to broker: {:?}", e);
            }
        }

        if stop.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
    tracing::info!("Fanout stopped");
}

async fn listen(
    registry: &ConnectionRegistry,
    mq: &MqConnection,
    stop: &AtomicBool,
) -> Result<(), crate::shared::mq::MqError> {
    let mut deliveries = mq.consume("palaver-socket").await?;

    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let delivery = match timeout(POLL_TIMEOUT, deliveries.next()).await {
            Err(_) => continue,
            Ok(None) => {
                tracing::warn!("Delivery stream ended");
                return Ok(());
            }
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(delivery))) => delivery,
        };

        match serde_json::from_slice::<TransportEnvelope>(&delivery.data) {
            Ok(envelope) => {
                deliver(registry, &envelope).await;
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Err(e) => {
                tracing::warn!("Rejecting undecodable delivery: {:?}", e);
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
        }
    }
}
