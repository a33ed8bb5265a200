//! Database Access
//!
//! Row types and query functions for the listener service. Every query runs
//! on a `&mut PgConnection` borrowed from the single request-scoped
//! transaction owned by the router, so a handler can never write outside
//! its transaction.
//!
//! # Conventions
//!
//! - Soft deletion everywhere: rows carry a `deleted` flag and every lookup
//!   that serves user traffic filters on it
//! - `fetch_optional` for lookups with a meaningful "not found"
//! - Identifiers are `BIGSERIAL` / `i64`

/// Forum sections, boards, threads, posts, edits, read markers
pub mod forum;

/// News items
pub mod news;

/// Session rows
pub mod sessions;

/// User accounts and legacy credentials
pub mod users;
