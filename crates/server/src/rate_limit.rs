use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Headers checked for the caller's address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 7] = [
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "true-client-ip",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the oldest counted request leaves the window.
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset_at_ms));
    }
}

#[derive(Debug, Serialize)]
struct RateLimitBody {
    error: &'static str,
    remaining: u32,
    reset: i64,
}

/// 429 response for a denied decision.
pub fn denial_response(decision: &RateLimitDecision) -> Response {
    let body = RateLimitBody {
        error: "Rate limit exceeded",
        remaining: decision.remaining,
        reset: decision.reset_at_ms,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    decision.apply_headers(response.headers_mut());
    response
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateLimitDecision;
}

/// Request timestamps for a single key, oldest first.
#[derive(Debug, Default)]
struct RateLimitEntry {
    requests: Vec<i64>,
}

impl RateLimitEntry {
    fn prune(&mut self, now_ms: i64, window_ms: i64) {
        let window_start = now_ms - window_ms;
        self.requests.retain(|&t| t > window_start);
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    entries: HashMap<String, RateLimitEntry>,
    last_sweep_ms: Option<i64>,
}

impl LimiterState {
    /// Drops keys with no request left in the window, at most once per window.
    fn sweep(&mut self, now_ms: i64, window_ms: i64) {
        let last = *self.last_sweep_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(last) < window_ms {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.prune(now_ms, window_ms);
            !entry.requests.is_empty()
        });
        self.last_sweep_ms = Some(now_ms);
        debug!(
            removed = before - self.entries.len(),
            tracked = self.entries.len(),
            "rate limit keys swept"
        );
    }
}

/// In-process sliding window limiter. Denied requests are not counted.
pub struct SlidingWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    state: RwLock<LimiterState>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests: max_requests.max(1), window, state: RwLock::new(LimiterState::default()) }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    pub async fn check_at(&self, key: &str, now_ms: i64) -> RateLimitDecision {
        let window_ms = self.window_ms();
        let limit = self.max_requests;

        let mut state = self.state.write().await;
        state.sweep(now_ms, window_ms);
        let entry = state.entries.entry(key.to_string()).or_default();
        entry.prune(now_ms, window_ms);

        let allowed = entry.requests.len() < limit as usize;
        if allowed {
            entry.requests.push(now_ms);
        }

        let used = u32::try_from(entry.requests.len()).unwrap_or(u32::MAX);
        let oldest = entry.requests.first().copied().unwrap_or(now_ms);
        let decision = RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(used),
            reset_at_ms: oldest.saturating_add(window_ms),
        };

        if allowed {
            debug!(client = %key, remaining = decision.remaining, "request allowed");
        } else {
            warn!(client = %key, limit, reset_at_ms = decision.reset_at_ms, "rate limit exceeded");
        }
        decision
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Utc::now().timestamp_millis()).await
    }
}

/// Rate-limit key for a request: the first forwarded address, else `"unknown"`.
pub fn client_key(headers: &HeaderMap) -> String {
    for name in CLIENT_IP_HEADERS {
        let Some(value) = headers.get(name).and_then(|value| value.to_str().ok()) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }
        if name == "x-forwarded-for" {
            if let Some(first) = value.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return first.to_string();
                }
            }
            continue;
        }
        return value.trim().to_string();
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    use super::{client_key, denial_response, SlidingWindowRateLimiter};

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_secs(60));

        let first = limiter.check_at("1.2.3.4", 1_000).await;
        let second = limiter.check_at("1.2.3.4", 2_000).await;
        let third = limiter.check_at("1.2.3.4", 3_000).await;

        assert!(first.allowed && second.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(second.remaining, 0);
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_at_ms, 61_000);
    }

    #[tokio::test]
    async fn window_slides_and_denials_are_not_counted() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(10));

        assert!(limiter.check_at("k", 0).await.allowed);
        for t in [1_000, 5_000, 9_000] {
            assert!(!limiter.check_at("k", t).await.allowed);
        }

        let later = limiter.check_at("k", 10_001).await;
        assert!(later.allowed, "oldest request left the window");
        assert_eq!(later.reset_at_ms, 20_001);
    }

    #[tokio::test]
    async fn keys_are_limited_independently() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check_at("a", 0).await.allowed);
        assert!(limiter.check_at("b", 0).await.allowed);
        assert!(!limiter.check_at("a", 1).await.allowed);
    }

    #[tokio::test]
    async fn expired_keys_are_swept() {
        let limiter = SlidingWindowRateLimiter::new(5, Duration::from_secs(1));
        for i in 0..10_000 {
            assert!(limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), 0).await.allowed);
        }

        limiter.check_at("203.0.113.9", 3_600_000).await;

        assert_eq!(limiter.state.read().await.entries.len(), 1);
    }

    #[tokio::test]
    async fn live_keys_survive_a_sweep() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.check_at("old", 0).await.allowed);
        assert!(limiter.check_at("recent", 9_000).await.allowed);

        limiter.check_at("new", 10_500).await;

        let state = limiter.state.read().await;
        assert!(!state.entries.contains_key("old"));
        assert!(state.entries.contains_key("recent"));
        drop(state);
        assert!(!limiter.check_at("recent", 11_000).await.allowed);
    }

    #[test]
    fn client_key_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        assert_eq!(client_key(&headers), "203.0.113.7");

        headers.remove("x-forwarded-for");
        assert_eq!(client_key(&headers), "10.0.0.9");

        assert_eq!(client_key(&HeaderMap::new()), "unknown");
    }

    #[tokio::test]
    async fn denial_response_carries_metadata() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_secs(60));
        limiter.check_at("k", 0).await;
        let decision = limiter.check_at("k", 5).await;

        let response = denial_response(&decision);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "1");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["x-ratelimit-reset"], "60000");
    }
}
