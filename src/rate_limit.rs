//! Per-session sliding-window rate limiter (spec.md §4.4).
//!
//! Generalizes `turbomcp-auth::rate_limit`'s `RateLimiter` down to the
//! simpler fixed-window-with-reset form spec.md names: each dimension tracks
//! only `{count, windowStart}` and resets wholesale once the window elapses,
//! rather than that module's per-timestamp sliding log.

use crate::error::BapError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct DimensionConfig {
    pub limit: u32,
    pub window: Duration,
}

/// Built-in dimensions and their spec.md-mandated defaults.
pub const REQUESTS: &str = "requests";
pub const SCREENSHOTS: &str = "screenshots";

fn default_dimensions() -> HashMap<&'static str, DimensionConfig> {
    let mut m = HashMap::new();
    m.insert(
        REQUESTS,
        DimensionConfig { limit: 50, window: Duration::from_secs(1) },
    );
    m.insert(
        SCREENSHOTS,
        DimensionConfig { limit: 30, window: Duration::from_secs(60) },
    );
    m
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    window_start: Instant,
}

/// One rate limiter per session, covering all dimensions for that session.
pub struct SessionRateLimiter {
    dimensions: HashMap<&'static str, DimensionConfig>,
    windows: Mutex<HashMap<&'static str, Window>>,
}

impl SessionRateLimiter {
    pub fn new() -> Self {
        Self { dimensions: default_dimensions(), windows: Mutex::new(HashMap::new()) }
    }

    #[cfg(test)]
    fn with_dimensions(dimensions: HashMap<&'static str, DimensionConfig>) -> Self {
        Self { dimensions, windows: Mutex::new(HashMap::new()) }
    }

    /// Record one unit of consumption against `dimension` at `now`. Returns
    /// `Ok(())` if under the limit, else a retryable `BapError` carrying
    /// `retryAfterMs` set to the remaining window.
    pub fn check_and_increment(&self, dimension: &'static str, now: Instant) -> Result<(), BapError> {
        let Some(cfg) = self.dimensions.get(dimension) else {
            return Ok(());
        };
        let mut windows = self.windows.lock();
        let entry = windows.entry(dimension).or_insert(Window { count: 0, window_start: now });

        if now.saturating_duration_since(entry.window_start) >= cfg.window {
            *entry = Window { count: 1, window_start: now };
            return Ok(());
        }

        if entry.count >= cfg.limit {
            let elapsed = now.saturating_duration_since(entry.window_start);
            let remaining = cfg.window.saturating_sub(elapsed);
            return Err(BapError::new(
                crate::error::ErrorCode::RateLimited,
                format!("Rate limit exceeded for dimension '{dimension}'"),
            )
            .with_retry_after(remaining));
        }

        entry.count += 1;
        Ok(())
    }
}

impl Default for SessionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_for_test() -> SessionRateLimiter {
        let mut dims = HashMap::new();
        dims.insert(REQUESTS, DimensionConfig { limit: 3, window: Duration::from_millis(100) });
        SessionRateLimiter::with_dimensions(dims)
    }

    #[test]
    fn allows_up_to_limit_within_window() {
        let limiter = limiter_for_test();
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_and_increment(REQUESTS, now).is_ok());
        }
        let err = limiter.check_and_increment(REQUESTS, now).unwrap_err();
        assert!(err.code.retryable());
        assert!(err.retry_after_ms.is_some());
    }

    #[test]
    fn resets_after_window_elapses() {
        let limiter = limiter_for_test();
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_and_increment(REQUESTS, now).unwrap();
        }
        let later = now + Duration::from_millis(150);
        assert!(limiter.check_and_increment(REQUESTS, later).is_ok());
    }

    #[test]
    fn unknown_dimension_is_unlimited() {
        let limiter = limiter_for_test();
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_and_increment("nonexistent", now).is_ok());
        }
    }

    #[test]
    fn dimensions_are_independent() {
        let limiter = SessionRateLimiter::new();
        let now = Instant::now();
        for _ in 0..50 {
            limiter.check_and_increment(REQUESTS, now).unwrap();
        }
        assert!(limiter.check_and_increment(REQUESTS, now).is_err());
        assert!(limiter.check_and_increment(SCREENSHOTS, now).is_ok());
    }
}
