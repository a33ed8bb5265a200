/**
 * Listener Error Types
 *
 * This module defines the error type used throughout the listener service.
 *
 * # Error Semantics
 *
 * A `ListenerError` escaping a handler is an *unhandled fault*: the router
 * rolls back both the storage transaction and the outbound channel, emits a
 * best-effort 500 envelope when the request carried a receipt, and the
 * consumer rejects the delivery. Expected outcomes - authorization denials,
 * validation failures, missing entities - are not errors; handlers answer
 * those with error envelopes and return `Ok`, letting the (empty)
 * transaction commit.
 */
use thiserror::Error;

use crate::shared::mq::MqError;

/// Listener-side error types
///
/// Everything here represents an infrastructure fault, not a user-facing
/// outcome; see the module documentation for the distinction.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Database query or transaction failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Broker publication failure
    #[error("transport error: {0}")]
    Transport(#[from] MqError),

    /// Payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Password hashing failure
    #[error("credential error: {0}")]
    Credential(#[from] bcrypt::BcryptError),
}
