//! HMAC-SHA256 Request & Payload Signing
//!
//! One shared-secret signing primitive serves two surfaces: inbound
//! request verification (base64 transport) and outbound webhook payload
//! signing (hex transport, per-target secret).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_bytes(secret: &str, data: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Build the canonical signing string for an inbound request.
///
/// Fixed field order: uppercased method, path (no query string), raw
/// body bytes as text, RFC3339 timestamp. No delimiters between fields.
pub fn canonical_string(method: &str, path: &str, body: &[u8], timestamp: &str) -> String {
    format!(
        "{}{}{}{}",
        method.to_uppercase(),
        path,
        String::from_utf8_lossy(body),
        timestamp
    )
}

/// Sign a canonical request string, returning the base64 signature.
pub fn sign_request(secret: &str, canonical: &str) -> String {
    BASE64.encode(hmac_bytes(secret, canonical.as_bytes()))
}

/// Verify a base64 request signature against a canonical string.
///
/// Length is checked first; the constant-time comparison only ever runs
/// over equal-length buffers.
pub fn verify_request(secret: &str, canonical: &str, signature: &str) -> bool {
    let expected = sign_request(secret, canonical);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// Sign a webhook payload with a target's own secret, hex-encoded.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    hex::encode(hmac_bytes(secret, payload))
}

/// Verify a hex payload signature, as a webhook receiver would.
pub fn verify_payload_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

/// Check that a signing timestamp falls within `[now - max_age, now]`.
///
/// Future timestamps are stale too, which blocks clock-skew abuse as
/// well as replays.
#[must_use]
pub fn is_fresh(timestamp: &DateTime<Utc>, max_age_secs: i64) -> bool {
    let age = Utc::now().signed_duration_since(*timestamp).num_seconds();
    (0..=max_age_secs).contains(&age)
}

/// Generate a random 32-byte hex signing secret.
pub fn generate_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison. Unequal lengths fail immediately without
/// comparing, so the fold only ever sees equal-length inputs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
