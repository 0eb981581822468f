//! Relay Gateway
//!
//! Bridges an internal automation system to registered external
//! consumers over HTTP: HMAC request authentication with replay
//! protection, CIDR allowlist admission, idempotent operation handling,
//! and signed webhook fan-out.

pub mod allowlist;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod ratelimit;
pub mod relay;
pub mod webhooks;
