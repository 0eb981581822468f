//! Relay Handler Seam
//!
//! The business system behind the gateway is an external collaborator;
//! the gateway only defines the trait it must satisfy. `EchoHandler`
//! stands in for it in development and tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::SignedCaller;

use super::operations::OperationRequest;

/// Outcome of a handled operation, cached verbatim by the idempotency
/// layer.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: u16,
    pub result: serde_json::Value,
}

/// Handler-side failures.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler refused the operation; surfaced as a validation error.
    #[error("{0}")]
    Rejected(String),

    /// Unexpected handler failure; logged, surfaced generically.
    #[error("handler failure: {0}")]
    Internal(String),
}

/// The downstream system that executes authenticated operations.
#[async_trait]
pub trait RelayHandler: Send + Sync {
    async fn handle(
        &self,
        caller: &SignedCaller,
        operation: OperationRequest,
    ) -> Result<HandlerResponse, HandlerError>;
}

/// Development handler that acknowledges every operation.
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl RelayHandler for EchoHandler {
    async fn handle(
        &self,
        caller: &SignedCaller,
        operation: OperationRequest,
    ) -> Result<HandlerResponse, HandlerError> {
        Ok(HandlerResponse {
            status: 200,
            result: serde_json::json!({
                "op": operation.name(),
                "caller_id": caller.caller_id,
                "accepted": true,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_handler_acknowledges() {
        let caller = SignedCaller {
            request_id: "r1".to_string(),
            caller_id: "device-7".to_string(),
        };
        let op = OperationRequest::ChatSend {
            message: "hi".to_string(),
            channel: None,
        };

        let response = EchoHandler.handle(&caller, op).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.result["op"], "chat_send");
        assert_eq!(response.result["caller_id"], "device-7");
    }
}
