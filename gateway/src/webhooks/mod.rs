//! Webhook registry and fan-out dispatch.
//!
//! Callers register HTTPS targets with per-target secrets and event
//! filters; emitted events are signed and delivered to every matching
//! target concurrently, with per-target failures isolated.

pub mod dispatch;
pub mod handlers;
pub mod registry;
pub mod types;

pub use dispatch::WebhookDispatcher;
pub use registry::{MemoryRegistry, PgRegistry, RegistryStore};
pub use types::{DeliveryAttempt, DeliveryReport, WebhookRegistration};
