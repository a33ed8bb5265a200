/**
 * Message Broker Connection
 *
 * This module wraps the AMQP connection used by both services. Each service
 * publishes to one queue and consumes from the other, with both queues
 * bound to a single durable direct exchange.
 *
 * # Topology
 *
 * - `to_listener` - client requests, published by the socket service and
 *   consumed by the listener
 * - `from_listener` - responses and broadcasts, published by the listener
 *   and consumed by the socket service
 *
 * # Publisher Confirms
 *
 * Channels run in confirm mode, so `publish` resolves only after the broker
 * has taken responsibility for the message.
 *
 * # Transport Seam
 *
 * The [`OutboundTransport`] trait is the narrow seam between the listener's
 * transactional outbound channel and the broker, so the channel (and the
 * fanout in front of it) can be exercised in tests with a recording stub
 * instead of a live broker.
 */
use async_trait::async_trait;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use thiserror::Error;

use crate::shared::config::BrokerConfig;
use crate::shared::envelope::TransportEnvelope;

/// Broker-layer error types
#[derive(Debug, Error)]
pub enum MqError {
    /// Underlying AMQP failure (connection, channel or protocol)
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// Message could not be serialized for publication
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound publication seam
///
/// Implemented by [`MqConnection`] in production and by recording stubs in
/// tests. The transactional outbound channel publishes exclusively through
/// this trait.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Publish one envelope to the transport
    async fn publish(&self, envelope: &TransportEnvelope) -> Result<(), MqError>;
}

/// One side of the broker conversation
///
/// Holds the connection, a channel in confirm mode, and the names of the
/// queues this service publishes to and consumes from.
pub struct MqConnection {
    connection: Connection,
    channel: Channel,
    exchange: String,
    publish_queue: String,
    consume_queue: String,
}

impl MqConnection {
    /// Connect as the listener service
    ///
    /// Consumes client requests and publishes responses.
    pub async fn connect_listener(config: &BrokerConfig) -> Result<Self, MqError> {
        Self::connect(config, &config.from_listener, &config.to_listener).await
    }

    /// Connect as the socket service
    ///
    /// Publishes client requests and consumes responses.
    pub async fn connect_socket(config: &BrokerConfig) -> Result<Self, MqError> {
        Self::connect(config, &config.to_listener, &config.from_listener).await
    }

    /// Connect and declare the full topology
    ///
    /// Declares the exchange and both queues idempotently, so either
    /// service can start first.
    async fn connect(
        config: &BrokerConfig,
        publish_queue: &str,
        consume_queue: &str,
    ) -> Result<Self, MqError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for queue in [&config.to_listener, &config.from_listener] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            channel
                .queue_bind(
                    queue,
                    &config.exchange,
                    queue,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        tracing::info!("Connected to message broker");

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
            publish_queue: publish_queue.to_string(),
            consume_queue: consume_queue.to_string(),
        })
    }

    /// Whether the underlying connection has been lost
    pub fn is_closed(&self) -> bool {
        !self.connection.status().connected()
    }

    /// Publish a JSON message to this service's outgoing queue
    ///
    /// Waits for the broker's publisher confirm before returning.
    pub async fn publish_json<T: Serialize>(&self, message: &T) -> Result<(), MqError> {
        let payload = serde_json::to_vec(message)?;
        self.channel
            .basic_publish(
                &self.exchange,
                &self.publish_queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Start consuming this service's incoming queue
    ///
    /// The returned consumer is a stream of deliveries; acknowledgement is
    /// the caller's responsibility.
    pub async fn consume(&self, consumer_tag: &str) -> Result<lapin::Consumer, MqError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.consume_queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }

    /// Close the channel and connection
    pub async fn close(&self) -> Result<(), MqError> {
        self.channel.close(200, "bye").await?;
        self.connection.close(200, "bye").await?;
        tracing::info!("Message broker connection closed");
        Ok(())
    }
}

#[async_trait]
impl OutboundTransport for MqConnection {
    async fn publish(&self, envelope: &TransportEnvelope) -> Result<(), MqError> {
        self.publish_json(envelope).await
    }
}
