/// Rate limiting middleware for the chat endpoints
///
/// Every `/api/chat/*` request costs a model call, so each user gets a token
/// bucket held in process memory. The budget is
/// `CHAT_RATE_LIMIT_PER_MINUTE` requests, refilled continuously.
///
/// # Algorithm
///
/// Uses token bucket algorithm:
/// - Tokens refill at constant rate
/// - Each request consumes 1 token
/// - Request blocked if bucket empty
///
/// # Headers
///
/// Response includes rate limit headers:
/// - `X-RateLimit-Limit`: Total requests allowed per minute
/// - `X-RateLimit-Remaining`: Whole tokens remaining
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// A limit of `0` disables the check.

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use daybook_shared::auth::middleware::AuthContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum requests per minute
    pub requests_per_minute: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,

    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,
}

impl RateLimit {
    /// A full-minute burst refilled evenly over the minute
    pub fn per_minute(requests_per_minute: u32) -> Self {
        RateLimit {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            bucket_capacity: requests_per_minute,
        }
    }
}

/// Token bucket state for one user
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,

    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a new full bucket
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Refills tokens based on elapsed time
    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * rate).min(capacity as f64);
        self.last_refill = now;
    }

    /// Attempts to consume N tokens
    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    /// Calculates seconds until N tokens available
    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }
}

/// Result of rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether request is allowed
    pub ok: bool,

    /// Whole tokens remaining
    pub remaining: u32,

    /// Seconds until the next request would be allowed
    pub retry_after: u64,
}

/// Per-user in-memory token buckets
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: RateLimit,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit.requests_per_minute > 0
    }

    /// Takes one token from `key`'s bucket
    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let RateLimit {
            refill_rate,
            bucket_capacity,
            ..
        } = self.limit;

        // Recover from poisoning
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(bucket_capacity, now));
        bucket.refill(refill_rate, bucket_capacity, now);

        let ok = bucket.try_consume(1.0);
        RateLimitResult {
            ok,
            remaining: bucket.tokens.floor() as u32,
            retry_after: if ok {
                0
            } else {
                bucket.seconds_until_available(1.0, refill_rate).max(1)
            },
        }
    }
}

/// Rate limiting middleware layer
///
/// Must run after the JWT layer, which provides the [`AuthContext`].
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    auth: AuthContext,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limiter = &state.rate_limiter;
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let result = limiter.check(&auth.user_id);
    if !result.ok {
        tracing::warn!(user_id = %auth.user_id, retry_after = result.retry_after, "Chat rate limit exceeded");
        return Err(create_rate_limit_error(result));
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from(limiter.limit().requests_per_minute),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    Ok(response)
}

/// Creates a rate limit exceeded error response
fn create_rate_limit_error(result: RateLimitResult) -> ApiError {
    ApiError::RateLimitExceeded {
        retry_after: result.retry_after,
        message: format!(
            "Too many requests. Try again in {} seconds",
            result.retry_after
        ),
    }
}
