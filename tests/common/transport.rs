//! Recording transport
//!
//! Stands in for the message broker in integration tests: everything the
//! listener publishes is captured for inspection instead of leaving the
//! process.

use std::sync::Mutex;

use async_trait::async_trait;
use palaver::shared::envelope::TransportEnvelope;
use palaver::shared::mq::{MqError, OutboundTransport};

/// Transport stub that records everything published to it
pub struct RecordingTransport {
    published: Mutex<Vec<TransportEnvelope>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the published envelopes, in publication order
    pub fn envelopes(&self) -> Vec<TransportEnvelope> {
        self.published.lock().unwrap().clone()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl OutboundTransport for RecordingTransport {
    async fn publish(&self, envelope: &TransportEnvelope) -> Result<(), MqError> {
        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
