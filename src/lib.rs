//! Palaver - Main Library
//!
//! Palaver is the backend for a small community platform: user accounts with
//! durable sessions, a forum (sections, boards, threads, posts with edit
//! history), news posts, and a presence/broadcast layer that connects browser
//! WebSocket clients to the application through an AMQP message broker.
//!
//! # Overview
//!
//! The system runs as two cooperating services that share this library:
//!
//! - **Listener service** (`palaver-listener`) - consumes request envelopes
//!   from the broker one at a time, resolves the caller's session, dispatches
//!   to a handler selected by a dotted route string, enforces authorization
//!   guards and payload schemas, and commits the outcome through a pair of
//!   transactions (PostgreSQL + a buffered outbound message channel) with
//!   all-or-nothing semantics per request.
//!
//! - **Socket service** (`palaver-socket`) - terminates WebSocket
//!   connections, forwards client requests into the broker, and fans
//!   responses and broadcasts back out to connected endpoints with
//!   per-recipient authorization filtering.
//!
//! # Module Structure
//!
//! The library is organized into three main modules:
//!
//! - **`shared`** - Types shared between both services
//!   - Wire envelopes and error codes
//!   - Broker connection and transport seam
//!   - Environment-driven configuration
//!
//! - **`listener`** - Request routing and handlers
//!   - Router, consumer loop, session resolution
//!   - Transactional outbound channel
//!   - Route dispatch, guards, schema validation
//!   - Auth / forum / news / admin / ping handlers and their queries
//!
//! - **`socket`** - WebSocket edge
//!   - Connection registry and broadcast fanout
//!   - Axum WebSocket server
//!
//! # Error Handling
//!
//! The library uses Rust's standard error handling:
//!
//! - `Result<T, E>` for fallible operations
//! - `Option<T>` for optional values
//! - Custom error types in `shared::mq` and `listener::error`

/// Shared types and data structures
pub mod shared;

/// Listener service: router, consumer, handlers
pub mod listener;

/// Socket service: WebSocket edge and broadcast fanout
pub mod socket;
