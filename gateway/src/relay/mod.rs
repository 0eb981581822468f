//! Relay pipeline core.
//!
//! Typed operation payloads, the business-handler seam, and the route
//! that ties idempotency checking and commit around handler execution.

pub mod handler;
pub mod operations;
pub mod routes;

pub use handler::{EchoHandler, HandlerError, HandlerResponse, RelayHandler};
pub use operations::OperationRequest;
pub use routes::relay;
