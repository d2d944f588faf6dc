use std::collections::HashMap;
use chrono::{DateTime, Utc, Duration};
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::seconds(60),
            max_requests: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject,
}

impl Decision {
    pub fn is_admitted(self) -> bool {
        matches!(self, Decision::Admit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub request_count: u32,
    pub window_start: DateTime<Utc>,
}

impl RateLimitEntry {
    fn open(now: DateTime<Utc>) -> Self {
        Self {
            request_count: 1,
            window_start: now,
        }
    }
}

/// Fixed-window limiter keyed by client identifier.
///
/// A window opens with the first admitted request and lasts `window_size`;
/// up to `max_requests` requests are admitted in it. The window is reset
/// outright once it has elapsed, so a burst straddling the boundary may see
/// up to twice the limit.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn check_and_record(&self, key: &str, now: DateTime<Utc>) -> Decision {
        // Lookup, decision and mutation share one critical section.
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get_mut(key) else {
            entries.insert(key.to_string(), RateLimitEntry::open(now));
            return Decision::Admit;
        };

        // A clock that went backwards gives a negative elapsed time, which
        // stays inside the current window.
        if now - entry.window_start >= self.config.window_size {
            *entry = RateLimitEntry::open(now);
            return Decision::Admit;
        }

        if entry.request_count >= self.config.max_requests {
            debug!(key, count = entry.request_count, "request rejected by rate limiter");
            return Decision::Reject;
        }

        entry.request_count += 1;
        Decision::Admit
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops entries whose window started at least `retention` ago (never less
    /// than one window). Such keys would be admitted with a fresh window on
    /// their next request anyway, so decisions are unaffected.
    pub fn sweep(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let horizon = retention.max(self.config.window_size);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.window_start < horizon);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, remaining = entries.len(), "swept stale rate limit entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Barrier};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(RateLimitConfig::default());

        for i in 0..5 {
            assert!(limiter.check_and_record("client", t0() + Duration::seconds(i)).is_admitted());
        }
        assert_eq!(limiter.check_and_record("client", t0() + Duration::seconds(10)), Decision::Reject);

        // Window measured from the first request, not the last.
        assert!(limiter.check_and_record("client", t0() + Duration::seconds(60)).is_admitted());
        let entry = limiter.entry("client").unwrap();
        assert_eq!(entry.request_count, 1);
        assert_eq!(entry.window_start, t0() + Duration::seconds(60));
    }

    #[test]
    fn test_rejection_leaves_entry_untouched() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..5 {
            limiter.check_and_record("client", t0());
        }
        let before = limiter.entry("client").unwrap();
        for s in 1..30 {
            assert_eq!(limiter.check_and_record("client", t0() + Duration::seconds(s)), Decision::Reject);
        }
        assert_eq!(limiter.entry("client").unwrap(), before);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..5 {
            limiter.check_and_record("a", t0());
        }
        assert_eq!(limiter.check_and_record("a", t0()), Decision::Reject);
        assert_eq!(limiter.check_and_record("b", t0()), Decision::Admit);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_boundary_burst_admits_twice_the_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let edge = t0() + Duration::seconds(59);
        assert!(limiter.check_and_record("k", t0()).is_admitted());
        for _ in 0..4 {
            assert!(limiter.check_and_record("k", edge).is_admitted());
        }
        let after = t0() + Duration::seconds(60);
        for _ in 0..5 {
            assert!(limiter.check_and_record("k", after).is_admitted());
        }
        assert_eq!(limiter.check_and_record("k", after), Decision::Reject);
    }

    #[test]
    fn test_custom_limits() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window_size: Duration::seconds(1),
            max_requests: 2,
        });
        assert!(limiter.check_and_record("k", t0()).is_admitted());
        assert!(limiter.check_and_record("k", t0()).is_admitted());
        assert!(!limiter.check_and_record("k", t0()).is_admitted());
        assert!(limiter.check_and_record("k", t0() + Duration::seconds(1)).is_admitted());
    }

    #[test]
    fn test_concurrent_first_requests_create_one_entry() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let threads = 32;
        let barrier = Arc::new(Barrier::new(threads));
        let now = t0();

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.check_and_record("10.0.0.1", now)
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| d.is_admitted())
            .count();

        assert_eq!(admitted, 5);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.entry("10.0.0.1").unwrap().request_count, 5);
    }

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.check_and_record("old", t0());
        limiter.check_and_record("fresh", t0() + Duration::seconds(590));

        let removed = limiter.sweep(t0() + Duration::seconds(600), Duration::seconds(600));
        assert_eq!(removed, 1);
        assert!(limiter.entry("old").is_none());
        assert!(limiter.entry("fresh").is_some());
    }

    #[test]
    fn test_sweep_never_shortens_a_live_window() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..5 {
            limiter.check_and_record("k", t0());
        }
        // Retention below the window is raised to the window.
        assert_eq!(limiter.sweep(t0() + Duration::seconds(30), Duration::seconds(1)), 0);
        assert_eq!(limiter.check_and_record("k", t0() + Duration::seconds(30)), Decision::Reject);
    }
}
