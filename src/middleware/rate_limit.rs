//! Per-client request limiting.
//!
//! [`RateLimiter`] is the counting service: one fixed window per key,
//! starting at the key's first request and reset once it has elapsed.
//! [`RateLimit`] is the stage that applies it to a path prefix and keys it by
//! client IP.
//!
//! The counters sit behind a synchronous mutex that is never held across an
//! `.await`. A request whose connection drops mid-pipeline therefore cannot
//! leave a counter half-updated: the increment either happened or it didn't.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::context::Context;
use crate::failure::Failure;
use crate::router::strip_mount;
use crate::stage::{BoxFuture, Flow, Stage};

/// Expired windows are swept once the table reaches this many keys.
const PRUNE_AT: usize = 10_000;

// ── RateLimiter ───────────────────────────────────────────────────────────────

/// Outcome of counting one request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the key's window resets.
    pub reset_after: Duration,
}

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Counts requests per key within a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    max: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window, entries: Mutex::new(HashMap::new()) }
    }

    pub fn max(&self) -> u32 { self.max }
    pub fn window(&self) -> Duration { self.window }

    /// Counts one request for `key` and says whether it may proceed.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Counts one request for `key`.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut entries = self.entries.lock();

        if entries.len() >= PRUNE_AT {
            let window = self.window;
            entries.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = entries
            .entry(key.to_owned())
            .or_insert(Window { count: 0, started: now });
        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }
        entry.count = entry.count.saturating_add(1);

        Decision {
            allowed: entry.count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// Requests counted for `key` in its current window.
    pub fn hits(&self, key: &str) -> u32 {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|w| now.duration_since(w.started) < self.window)
            .map_or(0, |w| w.count)
    }

    /// Drops every window that has already elapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.entries.lock().retain(|_, w| now.duration_since(w.started) < window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().len()
    }
}

// ── RateLimit stage ───────────────────────────────────────────────────────────

/// Applies a [`RateLimiter`] to every request under `prefix`.
#[derive(Clone, Debug)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    prefix: String,
    message: String,
    trust_proxy: bool,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, prefix: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            limiter,
            prefix: prefix.into(),
            message: message.into(),
            trust_proxy: false,
        }
    }

    /// Key by the left-most `X-Forwarded-For` address when present.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    fn limit(&self, mut ctx: Context) -> Flow {
        if strip_mount(ctx.path(), &self.prefix).is_none() {
            return Flow::Continue(ctx);
        }

        let key = ctx
            .client_ip(self.trust_proxy)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        let decision = self.limiter.check(&key);
        let reset_secs = decision.reset_after.as_secs().max(1);

        if !decision.allowed {
            warn!(client = %key, path = ctx.path(), "rate limit exceeded");
            return Flow::Fail(
                Failure::too_many_requests(self.message.clone())
                    .with_header(RETRY_AFTER, HeaderValue::from(reset_secs))
                    .with_header(LIMIT, HeaderValue::from(decision.limit))
                    .with_header(REMAINING, HeaderValue::from(0u32))
                    .with_header(RESET, HeaderValue::from(reset_secs)),
            );
        }

        debug!(client = %key, remaining = decision.remaining, "rate limit counted");
        let headers = &mut ctx.outgoing_mut().headers;
        headers.insert(LIMIT, HeaderValue::from(decision.limit));
        headers.insert(REMAINING, HeaderValue::from(decision.remaining));
        headers.insert(RESET, HeaderValue::from(reset_secs));
        Flow::Continue(ctx)
    }
}

const LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

impl Stage for RateLimit {
    fn call(&self, ctx: Context) -> BoxFuture {
        Box::pin(std::future::ready(self.limit(ctx)))
    }

    fn name(&self) -> &'static str { "rate_limit" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[tokio::test(start_paused = true)]
    async fn fifty_first_request_is_rejected_until_window_elapses() {
        let limiter = RateLimiter::new(50, HOUR);
        for _ in 0..50 {
            assert!(limiter.allow("203.0.113.1"));
        }
        assert!(!limiter.allow("203.0.113.1"));
        assert!(limiter.allow("203.0.113.2"), "keys are independent");

        tokio::time::advance(HOUR).await;
        assert!(limiter.allow("203.0.113.1"));
        assert_eq!(limiter.hits("203.0.113.1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down() {
        let limiter = RateLimiter::new(3, HOUR);
        assert_eq!(limiter.check("k").remaining, 2);
        assert_eq!(limiter.check("k").remaining, 1);
        let third = limiter.check("k");
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(!limiter.check("k").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_forgets_elapsed_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.allow("a");
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.allow("b");
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.hits("a"), 0);
        assert_eq!(limiter.hits("b"), 1);
    }

    fn from(ip: &str, path: &str) -> Context {
        Context::get(path).with_remote_addr(format!("{ip}:4000").parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn stage_only_counts_the_prefix() {
        let limiter = Arc::new(RateLimiter::new(1, HOUR));
        let stage = RateLimit::new(Arc::clone(&limiter), "/api", "slow down");

        assert!(matches!(stage.call(from("10.0.0.1", "/")).await, Flow::Continue(_)));
        assert!(matches!(stage.call(from("10.0.0.1", "/apiary")).await, Flow::Continue(_)));
        assert_eq!(limiter.hits("10.0.0.1"), 0);

        let Flow::Continue(ctx) = stage.call(from("10.0.0.1", "/api/v1/tours")).await else {
            panic!("first api request must pass");
        };
        assert_eq!(ctx.outgoing().headers.get("x-ratelimit-remaining").unwrap(), "0");

        match stage.call(from("10.0.0.1", "/api/v1/tours")).await {
            Flow::Fail(f) => {
                assert_eq!(f.status(), StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(f.message(), "slow down");
                assert!(f.headers().contains_key(RETRY_AFTER));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
