//! Test support for the listener service
//!
//! Only compiled for unit tests; integration tests carry their own copies
//! under `tests/common`.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::shared::envelope::TransportEnvelope;
use crate::shared::mq::{MqError, OutboundTransport};

/// Transport stub that records everything published to it
pub struct RecordingTransport {
    /// Envelopes in publication order
    pub published: Mutex<Vec<TransportEnvelope>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the published envelopes
    pub fn envelopes(&self) -> Vec<TransportEnvelope> {
        self.published.lock().unwrap().clone()
    }

    /// The `route` field of each published body, in order
    pub fn routes(&self) -> Vec<String> {
        self.envelopes()
            .iter()
            .map(|e| e.body["route"].as_str().unwrap_or("").to_string())
            .collect()
    }
}

#[async_trait]
impl OutboundTransport for RecordingTransport {
    async fn publish(&self, envelope: &TransportEnvelope) -> Result<(), MqError> {
        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
