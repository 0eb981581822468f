//! Rate Limit Middleware
//!
//! Runs after signature verification and keys ceilings off the
//! authenticated caller id.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::AppState;
use crate::auth::SignedCaller;
use crate::error::GatewayError;

/// Middleware enforcing per-caller request and burst ceilings.
///
/// Requires `SignedCaller` in request extensions; routes without it
/// pass through unlimited.
pub async fn rate_limit_by_caller(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(caller) = request.extensions().get::<SignedCaller>().cloned() else {
        return Ok(next.run(request).await);
    };

    match state.limiter.check(&caller.caller_id) {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            debug!(
                caller_id = %caller.caller_id,
                retry_after,
                "Rate limit exceeded"
            );
            Err(GatewayError::rate_limited(caller.request_id, retry_after))
        }
    }
}
