//! Admission Middleware
//!
//! First stage of the relay pipeline: callers outside every configured
//! range are rejected before authentication or handler code runs.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::warn;

use crate::api::AppState;
use crate::auth::REQUEST_ID_HEADER;
use crate::error::GatewayError;

use super::ip::extract_client_ip;

/// Middleware denying callers whose address is not allowlisted.
///
/// Returns 403 on deny. The request id header is echoed if present, even
/// though it has not been authenticated yet at this stage.
pub async fn require_admission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>();
    let client_ip = extract_client_ip(request.headers(), connect_info, state.config.trust_proxy);

    if !state.allowlist.is_allowed(client_ip) {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        warn!(ip = %client_ip, request_id = %request_id, "Denied caller outside allowlist");
        return Err(GatewayError::admission_denied(request_id));
    }

    Ok(next.run(request).await)
}
