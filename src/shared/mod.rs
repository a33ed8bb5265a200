//! Shared Module
//!
//! This module contains types and infrastructure shared by the listener and
//! socket services: the wire envelope structures exchanged over the message
//! broker, the broker connection itself, and environment-driven
//! configuration.
//!
//! # Overview
//!
//! Everything that crosses a service boundary lives here. Both services
//! serialize the same envelope types, talk to the same exchange and queues,
//! and read their settings through the same configuration loader, so a
//! change to any of these is a change to the protocol and belongs in one
//! place.

/// Wire envelopes, receipts and error codes
pub mod envelope;

/// Message broker connection and transport seam
pub mod mq;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use envelope::{
    ControlMessage, DeliveryHead, ErrorBody, FieldError, InboundHead, Receipt, RequestEnvelope,
    TransportEnvelope,
};
pub use mq::{MqConnection, MqError, OutboundTransport};
