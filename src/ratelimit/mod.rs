//! Sliding-window request throttling.
//!
//! Each endpoint keeps the timestamps of its requests inside a trailing
//! window. When the window is full the caller is suspended until the oldest
//! request ages out. Every request also pays a small courtesy delay.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Request bookkeeping for one endpoint.
#[derive(Debug)]
struct EndpointWindow {
    quota: usize,
    requests: VecDeque<Instant>,
}

/// Per-endpoint sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    courtesy_delay: Duration,
    endpoints: HashMap<String, EndpointWindow>,
}

impl RateLimiter {
    /// Create a limiter with the given window size and courtesy delay.
    pub fn new(window: Duration, courtesy_delay: Duration) -> Self {
        Self {
            window,
            courtesy_delay,
            endpoints: HashMap::new(),
        }
    }

    /// Register a quota (max requests per window) for an endpoint.
    pub fn with_quota(mut self, endpoint: &str, quota: usize) -> Self {
        self.endpoints.insert(
            endpoint.to_string(),
            EndpointWindow {
                quota,
                requests: VecDeque::new(),
            },
        );
        self
    }

    /// Wait until a request slot is available for `endpoint`, then record it.
    ///
    /// Returns the time spent waiting on the quota, not counting the
    /// courtesy delay. Endpoints without a registered quota only pay the
    /// courtesy delay.
    pub async fn acquire(&mut self, endpoint: &str) -> Duration {
        let mut waited = Duration::ZERO;

        if let Some(state) = self.endpoints.get_mut(endpoint) {
            let now = Instant::now();
            while let Some(&oldest) = state.requests.front() {
                if now.duration_since(oldest) >= self.window {
                    state.requests.pop_front();
                } else {
                    break;
                }
            }

            if state.requests.len() >= state.quota {
                if let Some(&oldest) = state.requests.front() {
                    let wait = (oldest + self.window).saturating_duration_since(now);
                    if !wait.is_zero() {
                        warn!(
                            "Rate limit reached for {}. Waiting {} seconds...",
                            endpoint,
                            wait.as_secs()
                        );
                        sleep(wait).await;
                        state.requests.clear();
                        waited = wait;
                    }
                }
            }

            state.requests.push_back(Instant::now());
            debug!(
                "{}: {}/{} requests in window",
                endpoint,
                state.requests.len(),
                state.quota
            );
        }

        if !self.courtesy_delay.is_zero() {
            sleep(self.courtesy_delay).await;
        }

        waited
    }

    /// Number of requests currently recorded for an endpoint.
    #[cfg(test)]
    pub fn recorded(&self, endpoint: &str) -> usize {
        self.endpoints
            .get(endpoint)
            .map(|s| s.requests.len())
            .unwrap_or(0)
    }
}

impl From<&crate::config::RateLimitConfig> for RateLimiter {
    fn from(config: &crate::config::RateLimitConfig) -> Self {
        Self::new(
            Duration::from_secs(config.window_seconds),
            Duration::from_millis(config.courtesy_delay_ms),
        )
        .with_quota(crate::feed::HOME_TIMELINE, config.home_timeline)
        .with_quota(crate::feed::USER_TWEETS, config.user_tweets)
        .with_quota(crate::feed::USER_INFO, config.user_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(900);

    #[tokio::test(start_paused = true)]
    async fn test_under_quota_does_not_wait() {
        let mut limiter = RateLimiter::new(WINDOW, Duration::ZERO).with_quota("ep", 3);

        for _ in 0..3 {
            assert_eq!(limiter.acquire("ep").await, Duration::ZERO);
        }
        assert_eq!(limiter.recorded("ep"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_plus_one_blocks_within_window() {
        let mut limiter = RateLimiter::new(WINDOW, Duration::ZERO).with_quota("ep", 3);

        for _ in 0..3 {
            limiter.acquire("ep").await;
        }

        let start = Instant::now();
        let waited = limiter.acquire("ep").await;
        let elapsed = start.elapsed();

        assert!(waited > Duration::ZERO);
        assert!(waited <= WINDOW);
        assert!(elapsed >= waited);
        // Window is cleared after a wait, then the new request is recorded.
        assert_eq!(limiter.recorded("ep"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_measured_from_oldest_request() {
        let mut limiter = RateLimiter::new(WINDOW, Duration::ZERO).with_quota("ep", 2);

        limiter.acquire("ep").await;
        tokio::time::advance(Duration::from_secs(300)).await;
        limiter.acquire("ep").await;

        let waited = limiter.acquire("ep").await;
        assert_eq!(waited, Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_requests_are_evicted() {
        let mut limiter = RateLimiter::new(WINDOW, Duration::ZERO).with_quota("ep", 2);

        limiter.acquire("ep").await;
        limiter.acquire("ep").await;
        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;

        assert_eq!(limiter.acquire("ep").await, Duration::ZERO);
        assert_eq!(limiter.recorded("ep"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_courtesy_delay_always_applies() {
        let delay = Duration::from_secs(2);
        let mut limiter = RateLimiter::new(WINDOW, delay).with_quota("ep", 10);

        let start = Instant::now();
        limiter.acquire("ep").await;
        limiter.acquire("unregistered").await;

        assert!(start.elapsed() >= delay * 2);
        assert_eq!(limiter.recorded("unregistered"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_are_independent() {
        let mut limiter = RateLimiter::new(WINDOW, Duration::ZERO)
            .with_quota("a", 1)
            .with_quota("b", 1);

        limiter.acquire("a").await;
        assert_eq!(limiter.acquire("b").await, Duration::ZERO);
    }
}
