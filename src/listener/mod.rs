//! Listener Module
//!
//! This module contains the request-processing half of the system: the
//! consumer that drains client envelopes from the broker, the router that
//! runs one request through its full lifecycle, and the handlers that do
//! the actual domain work.
//!
//! # Request Lifecycle
//!
//! For every consumed envelope the router:
//!
//! 1. Shape-checks the request (route present and bounded, data present)
//! 2. Selects a handler from the leading route segment
//! 3. Opens a database transaction and an outbound-channel transaction
//! 4. Resolves the caller's session against the open transaction
//! 5. Dispatches the remaining route segments through the handler's route
//!    table, applying authorization and schema guards
//! 6. Commits both transactions on success (storage first), or rolls both
//!    back and emits a best-effort 500 on failure
//!
//! There is no observable partial-commit state: either all durable writes
//! and all enqueued notifications become visible, or neither does.

/// Queue consumer loop
pub mod consumer;

/// Database row types and queries
pub mod db;

/// Route table resolution
pub mod dispatch;

/// Listener error types
pub mod error;

/// Operation guards (level, authentication, schema)
pub mod guards;

/// Request handlers
pub mod handlers;

/// Transactional outbound message channel
pub mod outbound;

/// Request router
pub mod router;

/// Declarative payload schemas
pub mod schema;

/// Session resolution
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

/// Re-export commonly used types
pub use consumer::Consumer;
pub use error::ListenerError;
pub use outbound::OutboundChannel;
pub use router::MessageRouter;
pub use session::{UserSession, LEVEL_ADMIN, LEVEL_GUEST, LEVEL_USER};
