//! Network allowlist admission control.
//!
//! Parses configured CIDR ranges and decides whether a caller address
//! is admitted. An allowlist with no valid entries denies everything.

pub mod ip;
pub mod matcher;
pub mod middleware;

pub use ip::extract_client_ip;
pub use matcher::{parse_allowlist, Allowlist, CidrRange};
pub use middleware::require_admission;
