//! Per-peer read-side state. The rate limiter lives inside the read pump, so
//! it needs no lock; the pump is the only writer.

use std::time::{Duration, Instant};

/// Steady-state cap: messages per sliding minute.
pub const RATE_LIMIT_PER_MIN: u32 = 60;

/// Cap during the reconnect burst window. An offline queue replaying on
/// reconnect would trip the steady-state limiter through no fault of the
/// user, so a freshly joined peer gets headroom for one minute.
pub const RATE_LIMIT_BURST: u32 = 240;

/// How long after join the burst cap applies.
pub const BURST_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    joined_at: Instant,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(now: Instant) -> Self {
        Self {
            joined_at: now,
            window_start: now,
            count: 0,
        }
    }

    /// Count one message; false means over the cap and the message should be
    /// rejected.
    pub fn allow(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) > Duration::from_secs(60) {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;

        let cap = if now.duration_since(self.joined_at) <= BURST_WINDOW {
            RATE_LIMIT_BURST
        } else {
            RATE_LIMIT_PER_MIN
        };
        self.count <= cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_window_allows_replay_volume() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(start);
        for _ in 0..RATE_LIMIT_BURST {
            assert!(limiter.allow(start));
        }
        assert!(!limiter.allow(start));
    }

    #[test]
    fn steady_state_caps_at_sixty() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(start);
        // Two minutes in: burst window over, new sliding window.
        let later = start + Duration::from_secs(120);
        limiter.allow(later);
        for _ in 1..RATE_LIMIT_PER_MIN {
            assert!(limiter.allow(later));
        }
        assert!(!limiter.allow(later));
    }

    #[test]
    fn window_resets_after_a_minute() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(start);
        let t1 = start + Duration::from_secs(120);
        for _ in 0..RATE_LIMIT_PER_MIN {
            limiter.allow(t1);
        }
        assert!(!limiter.allow(t1));

        let t2 = t1 + Duration::from_secs(61);
        assert!(limiter.allow(t2));
    }
}
