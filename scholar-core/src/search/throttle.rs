//! Process-wide request spacing for an upstream API.
//!
//! One gate per upstream. Every outbound request awaits `acquire()`, which
//! guarantees at least `min_interval` between consecutive request starts.
//! Waiters are served in arrival order because `tokio::sync::Mutex` is fair.

use crate::config::SearchConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spacing and 429 backoff for one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleProfile {
    pub min_interval: Duration,
    pub rate_limit_backoff: Duration,
}

impl ThrottleProfile {
    /// Literature search: 300 ms spacing, 5 s backoff after HTTP 429.
    pub fn search() -> Self {
        Self {
            min_interval: Duration::from_millis(300),
            rate_limit_backoff: Duration::from_secs(5),
        }
    }

    /// Citation lookup: 1 s spacing, 2 s backoff after HTTP 429.
    pub fn citation() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(2),
        }
    }

    pub fn search_from_config(config: &SearchConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
        }
    }

    pub fn citation_from_config(config: &SearchConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.citation_min_interval_ms),
            rate_limit_backoff: Duration::from_millis(config.citation_rate_limit_backoff_ms),
        }
    }
}

/// Awaitable gate around the instant of the last outbound request.
#[derive(Debug)]
pub struct ThrottleGate {
    profile: ThrottleProfile,
    last_request: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new(profile: ThrottleProfile) -> Self {
        Self {
            profile,
            last_request: Mutex::new(None),
        }
    }

    pub fn profile(&self) -> ThrottleProfile {
        self.profile
    }

    /// Wait until a request may start, then claim the slot.
    ///
    /// The lock is held across the sleep so later callers queue behind this one.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.profile.min_interval {
                let wait = self.profile.min_interval - elapsed;
                tracing::trace!(wait_ms = wait.as_millis() as u64, "Throttle gate waiting");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Sleep for the rate-limit backoff. The caller re-acquires the gate afterwards.
    pub async fn backoff(&self) {
        tokio::time::sleep(self.profile.rate_limit_backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let gate = ThrottleGate::new(ThrottleProfile::search());
        let start = Instant::now();
        gate.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_acquires_are_spaced() {
        let gate = ThrottleGate::new(ThrottleProfile::search());
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let gate = ThrottleGate::new(ThrottleProfile::search());
        gate.acquire().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        gate.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_overlap() {
        let gate = Arc::new(ThrottleGate::new(ThrottleProfile::citation()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                Instant::now()
            }));
        }
        let mut starts = Vec::new();
        for h in handles {
            starts.push(h.await.unwrap());
        }
        starts.sort();
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_duration() {
        let gate = ThrottleGate::new(ThrottleProfile::search());
        let start = Instant::now();
        gate.backoff().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_profiles_from_config() {
        let config = SearchConfig::default();
        assert_eq!(
            ThrottleProfile::search_from_config(&config),
            ThrottleProfile::search()
        );
        assert_eq!(
            ThrottleProfile::citation_from_config(&config),
            ThrottleProfile::citation()
        );
    }
}
