//! Relay Operations
//!
//! Tagged operation payloads. Every operation type is an explicit
//! variant with its own validation, so an unknown `op` fails
//! deserialization instead of reaching a handler with an unchecked
//! shape.

use serde::{Deserialize, Serialize};

const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_KEY_CHARS: usize = 256;

/// A relay operation, dispatched on the `op` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum OperationRequest {
    /// Forward a chat message into the automation system.
    ChatSend {
        message: String,
        #[serde(default)]
        channel: Option<String>,
    },
    /// Persist a value under a caller-scoped memory key.
    MemoryStore {
        key: String,
        value: serde_json::Value,
    },
    /// Read back a caller-scoped memory key.
    MemoryFetch { key: String },
    /// Trigger a named integration action.
    IntegrationTrigger {
        integration: String,
        action: String,
        #[serde(default)]
        args: serde_json::Value,
    },
}

impl OperationRequest {
    /// The operation name, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChatSend { .. } => "chat_send",
            Self::MemoryStore { .. } => "memory_store",
            Self::MemoryFetch { .. } => "memory_fetch",
            Self::IntegrationTrigger { .. } => "integration_trigger",
        }
    }

    /// Per-variant payload validation.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ChatSend { message, .. } => {
                if message.trim().is_empty() {
                    return Err("Message must not be empty".to_string());
                }
                if message.chars().count() > MAX_MESSAGE_CHARS {
                    return Err(format!("Message must be max {MAX_MESSAGE_CHARS} characters"));
                }
                Ok(())
            }
            Self::MemoryStore { key, .. } | Self::MemoryFetch { key } => {
                if key.trim().is_empty() {
                    return Err("Memory key must not be empty".to_string());
                }
                if key.chars().count() > MAX_KEY_CHARS {
                    return Err(format!("Memory key must be max {MAX_KEY_CHARS} characters"));
                }
                Ok(())
            }
            Self::IntegrationTrigger {
                integration,
                action,
                ..
            } => {
                if integration.trim().is_empty() || action.trim().is_empty() {
                    return Err("Integration and action must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}
