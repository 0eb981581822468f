//! Rate limiting for authenticated callers.
//!
//! In-process fixed-window limiting with a per-minute ceiling and a
//! short burst ceiling, keyed by caller id.

pub mod limiter;
pub mod middleware;

pub use limiter::{RateLimitConfig, RateLimiter};
pub use middleware::rate_limit_by_caller;
