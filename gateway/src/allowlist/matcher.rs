//! CIDR range parsing and matching.

use std::net::IpAddr;

use tracing::warn;

/// A single parsed allowlist entry (`network/prefix_len`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    pub network: IpAddr,
    pub prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR string like `192.168.1.0/24` or `2001:db8::/32`.
    ///
    /// Returns `None` for malformed input, out-of-range prefix lengths
    /// included.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr_str, prefix_str) = s.trim().split_once('/')?;
        let network: IpAddr = addr_str.trim().parse().ok()?;
        let prefix_len: u8 = prefix_str.trim().parse().ok()?;

        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max_prefix {
            return None;
        }

        Some(Self { network, prefix_len })
    }

    /// Check whether `addr` falls inside this range.
    ///
    /// Addresses are compared as fixed-width unsigned integers under a
    /// leading-ones mask of `prefix_len` bits. A family mismatch is a
    /// non-match, never an error.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(candidate)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(self.prefix_len))
                };
                (u32::from(candidate) & mask) == (u32::from(net) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(candidate)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - u32::from(self.prefix_len))
                };
                (u128::from(candidate) & mask) == (u128::from(net) & mask)
            }
            _ => false,
        }
    }
}

/// Immutable set of admitted network ranges, parsed once at startup.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    ranges: Vec<CidrRange>,
}

impl Allowlist {
    #[must_use]
    pub fn new(ranges: Vec<CidrRange>) -> Self {
        Self { ranges }
    }

    /// Number of valid parsed ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Decide admission for a caller address.
    ///
    /// An empty effective allowlist denies every address (fail closed).
    #[must_use]
    pub fn is_allowed(&self, addr: IpAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }
}

/// Parse a comma-separated allowlist configuration string.
///
/// Malformed entries are dropped with a warning rather than failing
/// startup; the remaining valid entries form the effective allowlist.
pub fn parse_allowlist(raw: &str) -> Allowlist {
    let mut ranges = Vec::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match CidrRange::parse(entry) {
            Some(range) => ranges.push(range),
            None => {
                warn!(entry = %entry, "Dropping malformed allowlist entry");
            }
        }
    }

    if ranges.is_empty() {
        warn!("Allowlist has no valid entries, all callers will be denied");
    }

    Allowlist::new(ranges)
}
