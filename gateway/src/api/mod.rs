//! API Router and Application State
//!
//! Central routing configuration and shared state. The middleware stack
//! encodes the fixed pipeline order: admission runs first, then
//! signature verification, then rate limiting; handler code never runs
//! for a request rejected earlier.

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    allowlist::{parse_allowlist, require_admission, Allowlist},
    auth::require_signature,
    config::Config,
    idempotency::{IdempotencyManager, MemoryRecordStore, PgRecordStore},
    ratelimit::{rate_limit_by_caller, RateLimitConfig, RateLimiter},
    relay::{self, EchoHandler, RelayHandler},
    webhooks::{handlers, MemoryRegistry, PgRegistry, RegistryStore, WebhookDispatcher},
};

/// Maximum buffered request body size.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<Config>,
    /// Parsed admission allowlist
    pub allowlist: Arc<Allowlist>,
    /// Per-caller rate limiter
    pub limiter: Arc<RateLimiter>,
    /// Idempotency manager over the configured store
    pub idempotency: Arc<IdempotencyManager>,
    /// Webhook registry over the configured store
    pub registry: Arc<dyn RegistryStore>,
    /// Webhook fan-out dispatcher
    pub dispatcher: Arc<WebhookDispatcher>,
    /// Downstream operation handler
    pub handler: Arc<dyn RelayHandler>,
    /// Database pool, present only in durable mode (health probing)
    pub pool: Option<PgPool>,
}

impl AppState {
    /// State over in-memory backends; lost on restart.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        let config = Arc::new(config);
        let registry: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());

        Self {
            allowlist: Arc::new(parse_allowlist(&config.allowed_networks)),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig {
                requests_per_minute: config.requests_per_minute,
                burst_limit: config.burst_limit,
            })),
            idempotency: Arc::new(IdempotencyManager::new(
                Arc::new(MemoryRecordStore::new()),
                config.idempotency_retention_hours,
            )),
            dispatcher: Arc::new(WebhookDispatcher::new(
                registry.clone(),
                Duration::from_secs(config.webhook_delivery_timeout_secs),
            )),
            registry,
            handler: Arc::new(EchoHandler),
            pool: None,
            config,
        }
    }

    /// State over durable Postgres backends.
    #[must_use]
    pub fn with_postgres(config: Config, pool: PgPool) -> Self {
        let config = Arc::new(config);
        let registry: Arc<dyn RegistryStore> = Arc::new(PgRegistry::new(pool.clone()));

        Self {
            allowlist: Arc::new(parse_allowlist(&config.allowed_networks)),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig {
                requests_per_minute: config.requests_per_minute,
                burst_limit: config.burst_limit,
            })),
            idempotency: Arc::new(IdempotencyManager::new(
                Arc::new(PgRecordStore::new(pool.clone())),
                config.idempotency_retention_hours,
            )),
            dispatcher: Arc::new(WebhookDispatcher::new(
                registry.clone(),
                Duration::from_secs(config.webhook_delivery_timeout_secs),
            )),
            registry,
            handler: Arc::new(EchoHandler),
            pool: Some(pool),
            config,
        }
    }

    /// Swap in the real downstream handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn RelayHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub const fn storage_backend(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

/// Liveness endpoint. Stays reachable without any auth headers so a
/// misconfigured caller can still diagnose the gateway.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.pool {
        None => None,
        Some(pool) => {
            let probe = tokio::time::timeout(
                Duration::from_secs(state.config.health_probe_timeout_secs),
                sqlx::query("SELECT 1").execute(pool),
            )
            .await;
            Some(match probe {
                Ok(Ok(_)) => "ok",
                _ => "unreachable",
            })
        }
    };

    Json(HealthResponse {
        status: "ok",
        storage: state.storage_backend(),
        database,
    })
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Layers run outermost-last: admission first, then signature, then
    // rate limiting.
    let relay_routes = Router::new()
        .route("/api/relay", post(relay::relay))
        .layer(from_fn_with_state(state.clone(), rate_limit_by_caller))
        .layer(from_fn_with_state(state.clone(), require_signature))
        .layer(from_fn_with_state(state.clone(), require_admission));

    let management_routes = Router::new()
        .route(
            "/api/webhooks",
            post(handlers::create_webhook).get(handlers::list_webhooks),
        )
        .route(
            "/api/webhooks/{id}",
            get(handlers::get_webhook).delete(handlers::delete_webhook),
        )
        .route("/api/events", post(handlers::emit_event))
        .layer(from_fn_with_state(state.clone(), require_signature))
        .layer(from_fn_with_state(state.clone(), require_admission));

    // Set runs first (outermost) so the generated id is visible to the
    // trace span; propagate copies it onto the response.
    Router::new()
        .route("/health", get(health))
        .merge(relay_routes)
        .merge(management_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        canonical_string, sign_request, CALLER_ID_HEADER, IDEMPOTENCY_KEY_HEADER,
        REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        create_router(AppState::in_memory(Config::default_for_test()))
    }

    /// Build a correctly signed request from an allowlisted address.
    fn signed_request(path: &str, body: &str, idempotency_key: Option<&str>) -> Request<Body> {
        signed_request_from("127.0.0.1", path, body, idempotency_key)
    }

    fn signed_request_from(
        ip: &str,
        path: &str,
        body: &str,
        idempotency_key: Option<&str>,
    ) -> Request<Body> {
        let config = Config::default_for_test();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let canonical = canonical_string("POST", path, body.as_bytes(), &timestamp);
        let signature = sign_request(&config.signing_secret, &canonical);

        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("X-Forwarded-For", ip)
            .header(REQUEST_ID_HEADER, "req-1")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(CALLER_ID_HEADER, "device-7")
            .header(SIGNATURE_HEADER, signature);
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CHAT_BODY: &str = r#"{"op": "chat_send", "payload": {"message": "hello"}}"#;

    #[tokio::test]
    async fn health_responds_without_auth_headers() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["storage"], "memory");
    }

    #[tokio::test]
    async fn responses_carry_a_propagated_request_id() {
        // Generated when absent
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get("x-request-id").is_some());

        // Echoed when supplied
        let response = test_router()
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "trace-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-42");
    }

    #[tokio::test]
    async fn signed_relay_roundtrip() {
        let response = test_router()
            .oneshot(signed_request("/api/relay", CHAT_BODY, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["op"], "chat_send");
        assert_eq!(json["caller_id"], "device-7");
    }

    #[tokio::test]
    async fn admission_precedes_authentication() {
        // Valid signature, non-allowlisted source address: 403, not 401.
        let response = test_router()
            .oneshot(signed_request_from("203.0.113.9", "/api/relay", CHAT_BODY, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["code"], "ADMISSION_DENIED");
        assert_eq!(json["request_id"], "req-1");
    }

    #[tokio::test]
    async fn missing_signature_header_is_unauthorized() {
        let request = Request::post("/api/relay")
            .header("X-Forwarded-For", "127.0.0.1")
            .header(REQUEST_ID_HEADER, "req-1")
            .header(TIMESTAMP_HEADER, chrono::Utc::now().to_rfc3339())
            .header(CALLER_ID_HEADER, "device-7")
            .body(Body::from(CHAT_BODY))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["code"], "AUTHENTICATION_FAILED");
    }

    #[tokio::test]
    async fn tampered_body_is_unauthorized() {
        let mut request = signed_request("/api/relay", CHAT_BODY, None);
        *request.body_mut() = Body::from(r#"{"op": "chat_send", "payload": {"message": "evil"}}"#);

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_operation_is_rejected() {
        let body = r#"{"op": "no_such_operation", "payload": {}}"#;
        let response = test_router()
            .oneshot(signed_request("/api/relay", body, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn replayed_key_returns_cached_result() {
        let router = test_router();

        let first = router
            .clone()
            .oneshot(signed_request("/api/relay", CHAT_BODY, Some("k1")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert!(first.headers().get("x-idempotency-replayed").is_none());
        let first_json = body_json(first).await;

        let second = router
            .oneshot(signed_request("/api/relay", CHAT_BODY, Some("k1")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(
            second.headers().get("x-idempotency-replayed").unwrap(),
            "true"
        );
        assert_eq!(body_json(second).await, first_json);
    }

    #[tokio::test]
    async fn reused_key_with_different_body_conflicts() {
        let router = test_router();

        let first = router
            .clone()
            .oneshot(signed_request("/api/relay", CHAT_BODY, Some("k1")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let other_body = r#"{"op": "chat_send", "payload": {"message": "different"}}"#;
        let second = router
            .oneshot(signed_request("/api/relay", other_body, Some("k1")))
            .await
            .unwrap();

        assert_eq!(second.status(), StatusCode::CONFLICT);
        let json = body_json(second).await;
        assert_eq!(json["code"], "IDEMPOTENCY_CONFLICT");
        assert_eq!(json["request_id"], "req-1");
    }

    #[tokio::test]
    async fn webhook_registration_roundtrip() {
        let router = test_router();

        let body = r#"{"url": "https://example.com/hook", "event_filter": ["order.created"]}"#;
        let created = router
            .clone()
            .oneshot(signed_request("/api/webhooks", body, None))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let created_json = body_json(created).await;
        assert!(created_json["secret"].is_string());
        let id = created_json["id"].as_str().unwrap().to_string();

        // Signed GET: canonical string covers the empty body.
        let config = Config::default_for_test();
        let path = format!("/api/webhooks/{id}");
        let timestamp = chrono::Utc::now().to_rfc3339();
        let canonical = canonical_string("GET", &path, b"", &timestamp);
        let signature = sign_request(&config.signing_secret, &canonical);
        let request = Request::get(&path)
            .header("X-Forwarded-For", "127.0.0.1")
            .header(REQUEST_ID_HEADER, "req-2")
            .header(TIMESTAMP_HEADER, timestamp)
            .header(CALLER_ID_HEADER, "device-7")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::empty())
            .unwrap();

        let fetched = router.oneshot(request).await.unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        let fetched_json = body_json(fetched).await;
        assert_eq!(fetched_json["id"], id.as_str());
        // Secret is returned once, at creation only.
        assert!(fetched_json.get("secret").is_none());
    }

    #[tokio::test]
    async fn rate_limit_ceiling_returns_429() {
        let mut config = Config::default_for_test();
        config.requests_per_minute = 2;
        config.burst_limit = 2;
        let router = create_router(AppState::in_memory(config));

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(signed_request("/api/relay", CHAT_BODY, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .oneshot(signed_request("/api/relay", CHAT_BODY, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("Retry-After").is_some());
    }
}
