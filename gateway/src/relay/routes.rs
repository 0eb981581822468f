//! Relay Route
//!
//! The pipeline tail: idempotency check, typed payload validation,
//! handler invocation, idempotency commit. Admission, signature, and
//! rate-limit stages have already run as middleware by the time this
//! handler sees a request.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info, instrument};

use crate::api::AppState;
use crate::auth::{SignedCaller, IDEMPOTENCY_KEY_HEADER};
use crate::error::{GatewayError, GatewayResult};
use crate::idempotency::{CheckOutcome, CommitOutcome, IdempotencyRecord};

use super::handler::HandlerError;
use super::operations::OperationRequest;

/// Header set on responses served from the idempotency cache.
pub const REPLAYED_HEADER: &str = "x-idempotency-replayed";

fn cached_response(record: &IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(record.status as u16).unwrap_or(StatusCode::OK);
    let mut response = (status, Json(record.result.clone())).into_response();
    response
        .headers_mut()
        .insert(REPLAYED_HEADER, axum::http::HeaderValue::from_static("true"));
    response
}

/// POST `/api/relay`
#[instrument(skip_all, fields(request_id = %caller.request_id, caller_id = %caller.caller_id))]
pub async fn relay(
    State(state): State<AppState>,
    caller: SignedCaller,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<Response> {
    let request_id = &caller.request_id;
    // Absence of the key disables idempotency for this call.
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    // Held across check → handler → commit so a racing duplicate waits
    // and then replays the committed record instead of re-executing.
    let _key_guard = match idempotency_key {
        Some(key) => Some(state.idempotency.lock_key(key).await),
        None => None,
    };

    if let Some(key) = idempotency_key {
        match state
            .idempotency
            .check(key, &body)
            .await
            .map_err(|e| GatewayError::internal(request_id, e))?
        {
            CheckOutcome::Proceed => {}
            CheckOutcome::Replay(record) => {
                debug!(key, "Replayed idempotent request served from cache");
                return Ok(cached_response(&record));
            }
            CheckOutcome::Conflict { existing } => {
                return Err(GatewayError::idempotency_conflict(
                    request_id,
                    existing.created_at,
                ));
            }
        }
    }

    let operation: OperationRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::validation(request_id, format!("Malformed operation: {e}")))?;
    operation
        .validate()
        .map_err(|message| GatewayError::validation(request_id, message))?;

    info!(op = operation.name(), "Relaying operation");

    let handled = state
        .handler
        .handle(&caller, operation)
        .await
        .map_err(|e| match e {
            HandlerError::Rejected(message) => GatewayError::validation(request_id, message),
            HandlerError::Internal(detail) => GatewayError::internal(request_id, detail),
        })?;

    if let Some(key) = idempotency_key {
        match state
            .idempotency
            .commit(key, &body, handled.status, &handled.result)
            .await
            .map_err(|e| GatewayError::internal(request_id, e))?
        {
            CommitOutcome::Stored(_) => {}
            // A racing duplicate won the key; its cached outcome is the
            // canonical one for this caller too.
            CommitOutcome::RacedReplay(record) => return Ok(cached_response(&record)),
            CommitOutcome::RacedConflict(existing) => {
                return Err(GatewayError::idempotency_conflict(
                    request_id,
                    existing.created_at,
                ));
            }
        }
    }

    let status = StatusCode::from_u16(handled.status).unwrap_or(StatusCode::OK);
    Ok((status, Json(handled.result)).into_response())
}
