//! Socket Module
//!
//! This module contains the WebSocket edge of the system: the server that
//! terminates browser connections, the registry tracking every open
//! endpoint, and the fanout that delivers responses and broadcasts coming
//! back from the listener service.
//!
//! # Data Flow
//!
//! Inbound: a client text frame is wrapped with the connection's identity
//! (and its cached session key) and published to the listener queue
//! unparsed - the listener owns all validation.
//!
//! Outbound: envelopes consumed from the broker are delivered per their
//! head flags - to one endpoint or broadcast to all eligible ones - while
//! control envelopes update the endpoint's cached session key and level
//! instead of reaching the client.

/// Broadcast delivery of outbound envelopes
pub mod fanout;

/// Connected endpoint registry
pub mod registry;

/// Axum WebSocket server
pub mod server;

/// Re-export commonly used types
pub use registry::ConnectionRegistry;
pub use server::{create_app, SocketState};
