//! Webhook Fan-Out Dispatcher
//!
//! Delivers one emitted event to every matching registration in a
//! single concurrent pass. Each target gets the same envelope bytes
//! signed with its own secret; one slow or failing target never blocks
//! or fails the others, and nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::sign_payload;

use super::registry::RegistryStore;
use super::types::{DeliveryAttempt, DeliveryReport, WebhookError, WebhookRegistration};

/// Fan-out dispatcher over a shared HTTP client.
pub struct WebhookDispatcher {
    registry: Arc<dyn RegistryStore>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    /// Build a dispatcher whose deliveries abort after `timeout`.
    pub fn new(registry: Arc<dyn RegistryStore>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("HTTP client with only a timeout configured");

        Self { registry, client }
    }

    /// Emit an event to every registration matching its type.
    ///
    /// Returns a per-target report; an empty attempt list means no
    /// registration matched.
    pub async fn emit(
        &self,
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<DeliveryReport, WebhookError> {
        if event_type.trim().is_empty() {
            return Err(WebhookError::Validation(
                "Event type must not be empty".to_string(),
            ));
        }

        let event_id = Uuid::new_v4();
        let targets = self.registry.find_for_event(event_type).await?;

        if targets.is_empty() {
            debug!(event_type, "No webhook registrations match event");
            return Ok(DeliveryReport {
                event_id,
                attempts: Vec::new(),
            });
        }

        let envelope = serde_json::json!({
            "type": event_type,
            "data": data,
            "ts": Utc::now().timestamp_millis(),
        });
        // Serialize once; every target signs the same bytes.
        let payload_bytes = serde_json::to_vec(&envelope)
            .map_err(|e| WebhookError::Validation(format!("Event data not serializable: {e}")))?;

        let deliveries = targets.iter().map(|target| {
            self.deliver_one(target, event_type, event_id, payload_bytes.clone())
        });
        let attempts = join_all(deliveries).await;

        let delivered = attempts.iter().filter(|a| a.succeeded()).count();
        info!(
            event_type,
            event_id = %event_id,
            targets = attempts.len(),
            delivered,
            "Webhook fan-out complete"
        );

        Ok(DeliveryReport { event_id, attempts })
    }

    async fn deliver_one(
        &self,
        target: &WebhookRegistration,
        event_type: &str,
        event_id: Uuid,
        payload_bytes: Vec<u8>,
    ) -> DeliveryAttempt {
        let signature = sign_payload(&target.secret, &payload_bytes);

        let start = std::time::Instant::now();
        let result = self
            .client
            .post(&target.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", format!("sha256={signature}"))
            .header("X-Webhook-Event", event_type)
            .header("X-Webhook-ID", event_id.to_string())
            .body(payload_bytes)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !resp.status().is_success() {
                    warn!(
                        target_id = %target.id,
                        event_id = %event_id,
                        status,
                        "Webhook target returned non-success status"
                    );
                }
                DeliveryAttempt {
                    target_id: target.id,
                    status: Some(status),
                    error: None,
                    latency_ms,
                }
            }
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    event_id = %event_id,
                    error = %e,
                    "Webhook delivery failed"
                );
                DeliveryAttempt {
                    target_id: target.id,
                    status: None,
                    error: Some(e.to_string()),
                    latency_ms,
                }
            }
        }
    }
}
