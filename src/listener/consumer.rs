/**
 * Queue Consumer
 *
 * This module drains client envelopes from the broker one at a time and
 * runs each through the router before taking the next: a request either
 * completes (the delivery is acknowledged) or fails (the delivery is
 * rejected without requeue, leaving dead-lettering to broker policy).
 * There is never more than one request in flight per consumer.
 *
 * # Lifecycle
 *
 * The receive loop polls with a short inactivity timeout so a cooperative
 * stop flag is observed between deliveries; an in-flight request is never
 * aborted. On broker connection loss the loop tears the connection down,
 * sleeps a fixed backoff and reconnects from scratch - no partial
 * connection state is reused. Database connectivity is pooled and heals
 * per-request, so a store outage rejects the deliveries it touches rather
 * than tearing down the consumer.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use sqlx::PgPool;
use tokio::time::timeout;

use crate::listener::router::MessageRouter;
use crate::shared::config::BrokerConfig;
use crate::shared::envelope::InboundEnvelope;
use crate::shared::mq::{MqConnection, MqError};

/// How long a single poll waits before re-checking the stop flag
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between reconnection attempts after a broker failure
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// The listener service's consume-route-acknowledge loop
pub struct Consumer {
    router: MessageRouter,
    broker: BrokerConfig,
    stop: Arc<AtomicBool>,
}

impl Consumer {
    /// Create a consumer over a database pool and broker settings
    pub fn new(pool: PgPool, broker: BrokerConfig) -> Self {
        Self {
            router: MessageRouter::new(pool),
            broker,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop at its next poll boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Connect and consume until stopped, reconnecting with a fixed
    /// backoff on broker failures
    pub async fn run(&self) {
        while !self.stopping() {
            match MqConnection::connect_listener(&self.broker).await {
                Ok(mq) => {
                    if let Err(e) = self.listen(&mq).await {
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

            if self.stopping() {
                break;
            }
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
        tracing::info!("Consumer stopped");
    }

    async fn listen(&self, mq: &MqConnection) -> Result<(), MqError> {
        let mut deliveries = mq.consume("palaver-listener").await?;

        loop {
            if self.stopping() {
                return Ok(());
            }

            let delivery = match timeout(POLL_TIMEOUT, deliveries.next()).await {
                // Inactivity; loop around and re-check the stop flag
                Err(_) => continue,
                Ok(None) => {
                    tracing::warn!("Delivery stream ended");
                    return Ok(());
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(delivery))) => delivery,
            };

            self.process(mq, delivery).await?;
        }
    }

    /// Route one delivery and settle it
    ///
    /// # Errors
    ///
    /// Only acknowledgement failures propagate (the channel itself is
    /// broken then); request failures reject the delivery and the loop
    /// moves on.
    async fn process(&self, mq: &MqConnection, delivery: Delivery) -> Result<(), MqError> {
        tracing::info!(delivery_tag = delivery.delivery_tag, "Consumed delivery");

        let envelope = match serde_json::from_slice::<InboundEnvelope>(&delivery.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Rejecting undecodable delivery: {:?}", e);
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
                return Ok(());
            }
        };

        match self.router.handle(mq, &envelope).await {
            Ok(()) => {
                delivery.ack(BasicAckOptions::default()).await?;
                tracing::debug!(delivery_tag = delivery.delivery_tag, "Acknowledged delivery");
            }
            Err(e) => {
                tracing::error!(
                    delivery_tag = delivery.delivery_tag,
                    "Request failed, rejecting delivery: {:?}",
                    e
                );
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
