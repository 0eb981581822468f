//! Webhook API Handlers
//!
//! Registration CRUD and event emission. All routes sit behind the
//! relay pipeline, so every request arrives with a verified caller.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::{generate_secret, SignedCaller};
use crate::error::{GatewayError, GatewayResult};

use super::types::{
    DeliveryReport, EmitEventRequest, RegisterWebhookRequest, WebhookCreatedResponse,
    WebhookError, WebhookRegistration, WebhookResponse,
};

fn map_error(request_id: &str, err: WebhookError) -> GatewayError {
    match err {
        WebhookError::Validation(message) => GatewayError::validation(request_id, message),
        WebhookError::NotFound => GatewayError::not_found(request_id),
        WebhookError::Database(e) => GatewayError::internal(request_id, e),
    }
}

/// Validate a registration URL before accepting it.
fn validate_url(url: &str) -> Result<(), WebhookError> {
    if url.len() < 10 || url.len() > 2048 {
        return Err(WebhookError::Validation(
            "URL must be between 10 and 2048 characters".to_string(),
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(WebhookError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let parsed = reqwest::Url::parse(url)
        .map_err(|_| WebhookError::Validation("Invalid URL format".to_string()))?;
    if parsed.host_str().is_none() {
        return Err(WebhookError::Validation(
            "URL must contain a host".to_string(),
        ));
    }

    Ok(())
}

/// POST `/api/webhooks`
#[instrument(skip(state, req))]
pub async fn create_webhook(
    State(state): State<AppState>,
    caller: SignedCaller,
    Json(req): Json<RegisterWebhookRequest>,
) -> GatewayResult<(StatusCode, Json<WebhookCreatedResponse>)> {
    let request_id = &caller.request_id;

    validate_url(&req.url).map_err(|e| map_error(request_id, e))?;
    if req.event_filter.is_empty() {
        return Err(GatewayError::validation(
            request_id,
            "At least one event filter entry is required",
        ));
    }

    let registration = WebhookRegistration {
        id: Uuid::new_v4(),
        url: req.url,
        secret: generate_secret(),
        event_filter: req.event_filter,
        created_at: Utc::now(),
    };
    let response = WebhookCreatedResponse {
        id: registration.id,
        url: registration.url.clone(),
        secret: registration.secret.clone(),
        event_filter: registration.event_filter.clone(),
        created_at: registration.created_at,
    };

    state
        .registry
        .insert(registration)
        .await
        .map_err(|e| map_error(request_id, e))?;

    info!(webhook_id = %response.id, caller_id = %caller.caller_id, "Webhook registered");

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET `/api/webhooks`
#[instrument(skip(state))]
pub async fn list_webhooks(
    State(state): State<AppState>,
    caller: SignedCaller,
) -> GatewayResult<Json<Vec<WebhookResponse>>> {
    let registrations = state
        .registry
        .list()
        .await
        .map_err(|e| map_error(&caller.request_id, e))?;

    Ok(Json(registrations.into_iter().map(Into::into).collect()))
}

/// GET `/api/webhooks/{id}`
#[instrument(skip(state))]
pub async fn get_webhook(
    State(state): State<AppState>,
    caller: SignedCaller,
    Path(id): Path<Uuid>,
) -> GatewayResult<Json<WebhookResponse>> {
    let registration = state
        .registry
        .get(id)
        .await
        .map_err(|e| map_error(&caller.request_id, e))?
        .ok_or_else(|| GatewayError::not_found(&caller.request_id))?;

    Ok(Json(registration.into()))
}

/// DELETE `/api/webhooks/{id}`
#[instrument(skip(state))]
pub async fn delete_webhook(
    State(state): State<AppState>,
    caller: SignedCaller,
    Path(id): Path<Uuid>,
) -> GatewayResult<StatusCode> {
    let deleted = state
        .registry
        .delete(id)
        .await
        .map_err(|e| map_error(&caller.request_id, e))?;

    if !deleted {
        return Err(GatewayError::not_found(&caller.request_id));
    }

    info!(webhook_id = %id, caller_id = %caller.caller_id, "Webhook deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST `/api/events`
#[instrument(skip(state, req))]
pub async fn emit_event(
    State(state): State<AppState>,
    caller: SignedCaller,
    Json(req): Json<EmitEventRequest>,
) -> GatewayResult<Json<DeliveryReport>> {
    let report = state
        .dispatcher
        .emit(&req.event_type, &req.data)
        .await
        .map_err(|e| map_error(&caller.request_id, e))?;

    Ok(Json(report))
}
