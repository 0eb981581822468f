//! Signature Verification Middleware

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::{AppState, MAX_BODY_BYTES};
use crate::error::GatewayError;

use super::signing;
use super::{CALLER_ID_HEADER, REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Authenticated caller injected into request extensions.
///
/// Carries only the identifiers downstream stages need; the signature
/// itself is discarded once verified.
#[derive(Debug, Clone)]
pub struct SignedCaller {
    /// Caller-chosen request identifier, echoed in error responses.
    pub request_id: String,
    /// Caller/device identifier.
    pub caller_id: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Middleware enforcing signed, fresh requests.
///
/// All four transport headers must be present before any signature is
/// computed. The raw body is buffered once for canonicalization and
/// reinstated for downstream handlers. On success a [`SignedCaller`]
/// lands in request extensions.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let (mut parts, body) = request.into_parts();

    let request_id = header_str(&parts.headers, REQUEST_ID_HEADER)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::auth_failed("unknown", "missing request id header"))?;
    let timestamp_raw = header_str(&parts.headers, TIMESTAMP_HEADER)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::auth_failed(request_id.clone(), "missing timestamp header"))?;
    let caller_id = header_str(&parts.headers, CALLER_ID_HEADER)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::auth_failed(request_id.clone(), "missing caller id header"))?;
    let signature = header_str(&parts.headers, SIGNATURE_HEADER)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::auth_failed(request_id.clone(), "missing signature header"))?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_raw)
        .map_err(|_| GatewayError::auth_failed(request_id.clone(), "malformed timestamp"))?
        .with_timezone(&Utc);

    if !signing::is_fresh(&timestamp, state.config.max_signature_age_secs) {
        warn!(request_id = %request_id, caller_id = %caller_id, "Rejected stale or future-dated request");
        return Err(GatewayError::auth_failed(
            request_id,
            "request timestamp outside freshness window",
        ));
    }

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::internal(request_id.clone(), e))?;

    let canonical =
        signing::canonical_string(parts.method.as_str(), parts.uri.path(), &bytes, &timestamp_raw);

    if !signing::verify_request(&state.config.signing_secret, &canonical, &signature) {
        warn!(request_id = %request_id, caller_id = %caller_id, "Rejected invalid request signature");
        return Err(GatewayError::auth_failed(request_id, "invalid signature"));
    }

    parts.extensions.insert(SignedCaller {
        request_id,
        caller_id,
    });

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller in handlers.
impl<S> axum::extract::FromRequestParts<S> for SignedCaller
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| GatewayError::auth_failed("unknown", "request was not authenticated"))
    }
}
