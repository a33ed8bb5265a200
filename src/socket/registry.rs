/**
 * Connection Registry
 *
 * This module tracks every open WebSocket endpoint: its outbound channel
 * to the per-connection writer task, and its cached session key and
 * authorization level.
 *
 * # Level Cache
 *
 * The fanout has no synchronous way to re-resolve a session per delivery,
 * so each endpoint caches its own current level. The cache is updated
 * *only* by control envelopes (emitted by the auth handler on login,
 * authenticate and logout); everything else reads it.
 *
 * # Concurrency
 *
 * The registry is the one resource genuinely shared across connections.
 * It is created once at process start and injected; entries are added on
 * connect, removed on disconnect, and snapshot-iterated on delivery, so a
 * reader never faults on a concurrent disconnect and a departed entry is
 * never delivered to after removal.
 */
use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::shared::envelope::ControlMessage;

/// Outbound text-frame channel to one connection's writer task
pub type EndpointSender = mpsc::UnboundedSender<String>;

struct EndpointEntry {
    sender: EndpointSender,
    session_key: Option<String>,
    level: i32,
}

/// Registry of currently connected endpoints
#[derive(Default)]
pub struct ConnectionRegistry {
    endpoints: RwLock<HashMap<String, EndpointEntry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened connection at guest level
    pub async fn insert(&self, connection_id: &str, sender: EndpointSender) {
        let entry = EndpointEntry {
            sender,
            session_key: None,
            level: 0,
        };
        self.endpoints
            .write()
            .await
            .insert(connection_id.to_string(), entry);
    }

    /// Remove a closed connection
    pub async fn remove(&self, connection_id: &str) {
        self.endpoints.write().await.remove(connection_id);
    }

    /// Number of connected endpoints
    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    /// Whether no endpoints are connected
    pub async fn is_empty(&self) -> bool {
        self.endpoints.read().await.is_empty()
    }

    /// The session key cached for a connection
    pub async fn session_key(&self, connection_id: &str) -> Option<String> {
        self.endpoints
            .read()
            .await
            .get(connection_id)
            .and_then(|entry| entry.session_key.clone())
    }

    /// The authorization level cached for a connection
    pub async fn level(&self, connection_id: &str) -> Option<i32> {
        self.endpoints
            .read()
            .await
            .get(connection_id)
            .map(|entry| entry.level)
    }

    /// Update a connection's cached session state from a control envelope
    pub async fn apply_control(&self, connection_id: &str, control: &ControlMessage) {
        let mut endpoints = self.endpoints.write().await;
        if let Some(entry) = endpoints.get_mut(connection_id) {
            entry.session_key = control.session_key.clone();
            entry.level = control.level;
            tracing::debug!(
                connection_id,
                level = control.level,
                authenticated = entry.session_key.is_some(),
                "Endpoint session state updated"
            );
        }
    }

    /// Deliver a frame to one endpoint if it is connected and privileged
    /// enough; silently drops otherwise
    pub async fn send_to(&self, connection_id: &str, min_level: i32, text: &str) -> bool {
        let endpoints = self.endpoints.read().await;
        match endpoints.get(connection_id) {
            Some(entry) if entry.level >= min_level => {
                if entry.sender.send(text.to_string()).is_err() {
                    tracing::debug!(connection_id, "Endpoint writer is gone");
                    return false;
                }
                true
            }
            _ => false,
        }
    }

    /// Snapshot the endpoints eligible for a broadcast
    ///
    /// Skips `skip` (the origin, when avoiding self) and every endpoint
    /// below `min_level`.
    pub async fn broadcast_targets(
        &self,
        skip: Option<&str>,
        min_level: i32,
    ) -> Vec<(String, EndpointSender)> {
        self.endpoints
            .read()
            .await
            .iter()
            .filter(|(id, entry)| Some(id.as_str()) != skip && entry.level >= min_level)
            .map(|(id, entry)| (id.clone(), entry.sender.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (EndpointSender, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = ConnectionRegistry::new();
        let (sender, _receiver) = channel();

        registry.insert("c1", sender).await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.level("c1").await, Some(0));
        assert_eq!(registry.session_key("c1").await, None);

        registry.remove("c1").await;
        assert!(registry.is_empty().await);
        assert_eq!(registry.level("c1").await, None);
    }

    #[tokio::test]
    async fn test_control_updates_cache() {
        let registry = ConnectionRegistry::new();
        let (sender, _receiver) = channel();
        registry.insert("c1", sender).await;

        registry
            .apply_control(
                "c1",
                &ControlMessage {
                    session_key: Some("abc".to_string()),
                    level: 2,
                },
            )
            .await;
        assert_eq!(registry.level("c1").await, Some(2));
        assert_eq!(registry.session_key("c1").await, Some("abc".to_string()));

        // Logout clears the key and drops back to guest
        registry
            .apply_control(
                "c1",
                &ControlMessage {
                    session_key: None,
                    level: 0,
                },
            )
            .await;
        assert_eq!(registry.level("c1").await, Some(0));
        assert_eq!(registry.session_key("c1").await, None);
    }

    #[tokio::test]
    async fn test_send_to_respects_level() {
        let registry = ConnectionRegistry::new();
        let (sender, mut receiver) = channel();
        registry.insert("c1", sender).await;

        // Guest endpoint must not receive level-1 traffic
        assert!(!registry.send_to("c1", 1, "secret").await);
        assert!(receiver.try_recv().is_err());

        assert!(registry.send_to("c1", 0, "hello").await);
        assert_eq!(receiver.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_to_unknown_endpoint_drops_silently() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to("ghost", 0, "hello").await);
    }

    #[tokio::test]
    async fn test_broadcast_targets_filtering() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel();
        let (s2, _r2) = channel();
        let (s3, _r3) = channel();
        registry.insert("c0", s1).await;
        registry.insert("c1", s2).await;
        registry.insert("c2", s3).await;
        for (id, level) in [("c0", 0), ("c1", 1), ("c2", 2)] {
            registry
                .apply_control(
                    id,
                    &ControlMessage {
                        session_key: Some(format!("key-{}", id)),
                        level,
                    },
                )
                .await;
        }

        // Level-1 broadcast avoiding the level-1 sender reaches only c2
        let targets = registry.broadcast_targets(Some("c1"), 1).await;
        let ids: Vec<_> = targets.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c2"]);
    }
}
