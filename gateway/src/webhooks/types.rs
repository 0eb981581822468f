//! Webhook Types
//!
//! Registrations, delivery reports, and API request/response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A registered delivery target.
///
/// The secret is generated at registration, returned exactly once in
/// the creation response, and never surfaced again.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookRegistration {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    /// Event types this target receives; `"*"` matches every type.
    pub event_filter: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookRegistration {
    /// Whether this registration should receive `event_type`.
    #[must_use]
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_filter
            .iter()
            .any(|f| f == "*" || f == event_type)
    }
}

/// Outcome of one delivery attempt within a fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub target_id: Uuid,
    /// HTTP status from the target, if a response arrived.
    pub status: Option<u16>,
    /// Transport or timeout failure, if no response arrived.
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl DeliveryAttempt {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// Fan-out summary for one emitted event.
#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    pub event_id: Uuid,
    pub attempts: Vec<DeliveryAttempt>,
}

/// POST body for registering a webhook.
#[derive(Debug, Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
    pub event_filter: Vec<String>,
}

/// Creation response; the only place the secret ever appears.
#[derive(Debug, Serialize)]
pub struct WebhookCreatedResponse {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    pub event_filter: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Read response; secret withheld.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub event_filter: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookRegistration> for WebhookResponse {
    fn from(r: WebhookRegistration) -> Self {
        Self {
            id: r.id,
            url: r.url,
            event_filter: r.event_filter,
            created_at: r.created_at,
        }
    }
}

/// POST body for emitting an event.
#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Webhook subsystem errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{0}")]
    Validation(String),

    #[error("webhook not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
