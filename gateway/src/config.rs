//! Gateway Configuration
//!
//! Loads configuration from environment variables once at startup; the
//! resulting struct is shared read-only for the process lifetime.

use anyhow::{Context, Result};
use std::env;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080")
    pub bind_address: String,

    /// Shared HMAC signing secret for inbound request verification
    pub signing_secret: String,

    /// Comma-separated CIDR allowlist (e.g., "10.0.0.0/8,2001:db8::/32")
    pub allowed_networks: String,

    /// Maximum signature age in seconds (default: 300)
    pub max_signature_age_secs: i64,

    /// Per-caller request ceiling per minute (default: 120)
    pub requests_per_minute: u32,

    /// Per-caller ceiling per 10-second burst window (default: 20)
    pub burst_limit: u32,

    /// Trust X-Forwarded-For / X-Real-IP headers (default: false)
    pub trust_proxy: bool,

    /// Idempotency record retention horizon in hours (default: 24)
    pub idempotency_retention_hours: i64,

    /// `PostgreSQL` connection URL; absence selects in-memory storage
    pub database_url: Option<String>,

    /// Outbound webhook delivery timeout in seconds (default: 10)
    pub webhook_delivery_timeout_secs: u64,

    /// Health endpoint storage probe timeout in seconds (default: 3)
    pub health_probe_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            signing_secret: env::var("RELAY_SIGNING_SECRET")
                .context("RELAY_SIGNING_SECRET must be set")?,
            allowed_networks: env::var("RELAY_ALLOWED_NETWORKS").unwrap_or_default(),
            max_signature_age_secs: env::var("RELAY_MAX_SIGNATURE_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            requests_per_minute: env::var("RELAY_REQUESTS_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            burst_limit: env::var("RELAY_BURST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            trust_proxy: env::var("RELAY_TRUST_PROXY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            idempotency_retention_hours: env::var("IDEMPOTENCY_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            database_url: env::var("DATABASE_URL").ok(),
            webhook_delivery_timeout_secs: env::var("WEBHOOK_DELIVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            health_probe_timeout_secs: env::var("HEALTH_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".into(),
            signing_secret: "test-signing-secret".into(),
            allowed_networks: "127.0.0.1/32,10.0.0.0/8".into(),
            max_signature_age_secs: 300,
            requests_per_minute: 120,
            burst_limit: 20,
            trust_proxy: true,
            idempotency_retention_hours: 24,
            database_url: None,
            webhook_delivery_timeout_secs: 2,
            health_probe_timeout_secs: 3,
        }
    }
}
