//! Request authentication.
//!
//! HMAC-SHA256 signing over a canonical request string, replay-window
//! enforcement, and the axum middleware that gates the relay pipeline.

pub mod middleware;
pub mod signing;

pub use middleware::{require_signature, SignedCaller};
pub use signing::{
    canonical_string, generate_secret, is_fresh, sign_payload, sign_request,
    verify_payload_signature, verify_request,
};

/// Header carrying the caller-chosen request identifier.
pub const REQUEST_ID_HEADER: &str = "x-relay-request-id";
/// Header carrying the RFC3339 signing timestamp.
pub const TIMESTAMP_HEADER: &str = "x-relay-timestamp";
/// Header carrying the caller/device identifier.
pub const CALLER_ID_HEADER: &str = "x-relay-caller";
/// Header carrying the base64-encoded request signature.
pub const SIGNATURE_HEADER: &str = "x-relay-signature";
/// Optional header carrying a client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
