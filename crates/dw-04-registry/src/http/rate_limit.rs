//! Per-IP token bucket rate limiting.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::domain::errors::RegistryError;

/// Buckets idle longer than this are dropped by [`RateLimitState::cleanup`].
pub const BUCKET_IDLE_TTL: Duration = Duration::from_secs(600);

struct TokenBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    last_access: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(rate);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            last_access: Instant::now(),
        }
    }

    fn check(&mut self) -> Result<(), Duration> {
        self.last_access = Instant::now();
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }
}

/// Rate limiter state shared across requests.
pub struct RateLimitState {
    buckets: DashMap<IpAddr, TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Take one token for `ip`. On refusal returns the wait until the next
    /// token.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        if !self.config.enabled || self.config.whitelist.contains(&ip) {
            return Ok(());
        }
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| {
            debug!(ip = %ip, "[dw-04] Creating rate limit bucket");
            TokenBucket::new(&self.config)
        });
        bucket.check()
    }

    /// Drop buckets idle for longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_access) <= max_age);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Middleware rejecting over-limit clients with `429 RATE_LIMITED`.
///
/// Requests without connection info (in-process tests) share the
/// unspecified address bucket.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimitState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check(ip) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            warn!(ip = %ip, wait_ms = wait.as_millis() as u64, "[dw-04] Rate limit exceeded");
            RegistryError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rps: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rps,
            burst_size: burst,
            enabled: true,
            whitelist: Vec::new(),
        }
    }

    #[test]
    fn test_burst_then_refuse() {
        let state = RateLimitState::new(config(1, 3));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..3 {
            assert!(state.check(ip).is_ok());
        }
        assert!(state.check(ip).is_err());
    }

    #[test]
    fn test_buckets_are_per_ip() {
        let state = RateLimitState::new(config(1, 1));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(state.check(a).is_ok());
        assert!(state.check(a).is_err());
        assert!(state.check(b).is_ok());
        assert_eq!(state.bucket_count(), 2);
    }

    #[test]
    fn test_whitelist_and_disabled() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let mut cfg = config(1, 1);
        cfg.whitelist.push(ip);
        let state = RateLimitState::new(cfg);
        for _ in 0..10 {
            assert!(state.check(ip).is_ok());
        }

        let mut cfg = config(1, 1);
        cfg.enabled = false;
        let state = RateLimitState::new(cfg);
        for _ in 0..10 {
            assert!(state.check(ip).is_ok());
        }
        assert_eq!(state.bucket_count(), 0);
    }

    #[test]
    fn test_cleanup_drops_idle_buckets() {
        let state = RateLimitState::new(config(10, 10));
        state.check("10.0.0.1".parse().unwrap()).unwrap();
        state.cleanup(Duration::from_secs(60));
        assert_eq!(state.bucket_count(), 1);
        state.cleanup(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        state.cleanup(Duration::ZERO);
        assert_eq!(state.bucket_count(), 0);
    }
}
