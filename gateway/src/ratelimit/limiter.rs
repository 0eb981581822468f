//! Fixed-window rate limiter.

use dashmap::DashMap;

/// Window length for the per-minute ceiling.
const MINUTE_WINDOW_SECS: u64 = 60;
/// Window length for the short-burst ceiling.
const BURST_WINDOW_SECS: u64 = 10;

/// Ceilings for a single caller.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests per 60-second window.
    pub requests_per_minute: u32,
    /// Maximum requests per 10-second burst window.
    pub burst_limit: u32,
}

#[derive(Debug, Default)]
struct WindowCounters {
    minute_window: u64,
    minute_count: u32,
    burst_window: u64,
    burst_count: u32,
}

/// Per-caller fixed-window counters over a lock-free map.
///
/// Single-process by design: the gateway interleaves requests on async
/// I/O, and each caller's counters live under one map shard lock.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: DashMap<String, WindowCounters>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            counters: DashMap::new(),
        }
    }

    /// Check and count a request for `caller_id`.
    ///
    /// Returns `Err(retry_after_secs)` when either ceiling is exceeded;
    /// a rejected request is not counted against later windows.
    pub fn check(&self, caller_id: &str) -> Result<(), u64> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.check_at(caller_id, now)
    }

    fn check_at(&self, caller_id: &str, now: u64) -> Result<(), u64> {
        let minute_window = now / MINUTE_WINDOW_SECS;
        let burst_window = now / BURST_WINDOW_SECS;

        let mut counters = self.counters.entry(caller_id.to_string()).or_default();

        if counters.minute_window != minute_window {
            counters.minute_window = minute_window;
            counters.minute_count = 0;
        }
        if counters.burst_window != burst_window {
            counters.burst_window = burst_window;
            counters.burst_count = 0;
        }

        if counters.burst_count >= self.config.burst_limit {
            return Err((burst_window + 1) * BURST_WINDOW_SECS - now);
        }
        if counters.minute_count >= self.config.requests_per_minute {
            return Err((minute_window + 1) * MINUTE_WINDOW_SECS - now);
        }

        counters.minute_count += 1;
        counters.burst_count += 1;
        Ok(())
    }

    /// Drop counters whose windows have long expired. Called from the
    /// recurring cleanup worker, never per-request.
    pub fn prune(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let current_minute = now / MINUTE_WINDOW_SECS;
        self.counters
            .retain(|_, c| current_minute.saturating_sub(c.minute_window) <= 1);
    }
}
