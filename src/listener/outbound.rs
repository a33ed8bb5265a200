/**
 * Transactional Outbound Channel
 *
 * This module wraps broker publication in transaction-like semantics. The
 * broker itself has no transactions; the channel gets the same effect by
 * buffering every message enqueued while a transaction is open and only
 * publishing on commit.
 *
 * # Guarantees
 *
 * - While a transaction is open no message reaches the transport, so a
 *   handler that enqueues a notification and then fails can never leak a
 *   partial notification.
 * - On commit, buffered messages are flushed in enqueue order.
 * - Delivery flags (`connection_id`, `broadcast`, `avoid_self`,
 *   `is_control`, `req_level`) are fixed at enqueue time; nothing is
 *   re-derived at flush time.
 * - Outside a transaction the channel degrades to a pass-through publisher.
 */
use serde_json::Value;

use crate::shared::envelope::{DeliveryHead, TransportEnvelope};
use crate::shared::mq::{MqError, OutboundTransport};

/// Buffered, transactional wrapper over an [`OutboundTransport`]
pub struct OutboundChannel<'a> {
    transport: &'a dyn OutboundTransport,
    in_transaction: bool,
    buffer: Vec<TransportEnvelope>,
}

impl<'a> OutboundChannel<'a> {
    /// Create a channel over a transport, with no transaction open
    pub fn new(transport: &'a dyn OutboundTransport) -> Self {
        Self {
            transport,
            in_transaction: false,
            buffer: Vec::new(),
        }
    }

    /// Open a transaction, discarding any stale buffer
    pub fn begin(&mut self) {
        self.in_transaction = true;
        self.buffer.clear();
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Number of messages currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Enqueue a message tagged with its delivery head
    ///
    /// Inside a transaction this only buffers; outside one it publishes
    /// immediately.
    pub async fn publish(&mut self, head: DeliveryHead, body: Value) -> Result<(), MqError> {
        let envelope = TransportEnvelope { head, body };
        if self.in_transaction {
            self.buffer.push(envelope);
            Ok(())
        } else {
            self.transport.publish(&envelope).await
        }
    }

    /// Flush the buffer to the transport in enqueue order and end the
    /// transaction
    ///
    /// # Errors
    ///
    /// A transport failure mid-flush is propagated; messages after the
    /// failing one are dropped with a log line rather than retried, since
    /// the caller is about to surface the fault anyway.
    pub async fn commit(&mut self) -> Result<(), MqError> {
        let pending = std::mem::take(&mut self.buffer);
        self.in_transaction = false;

        let total = pending.len();
        for (index, envelope) in pending.into_iter().enumerate() {
            if let Err(e) = self.transport.publish(&envelope).await {
                tracing::error!(
                    "Outbound flush failed after {}/{} messages: {:?}",
                    index,
                    total,
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Discard the buffer without publishing and end the transaction
    pub fn rollback(&mut self) {
        self.buffer.clear();
        self.in_transaction = false;
    }

    /// Release the channel; safe to call after commit or rollback
    pub fn close(&mut self) {
        self.buffer.clear();
        self.in_transaction = false;
    }
}
