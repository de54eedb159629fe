use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, StoreError};
use crate::metrics::{RATE_LIMITED_TOTAL, RATE_LIMIT_STORE_ERRORS};
use crate::store::SharedStore;

pub const KEY_PREFIX: &str = "rate_limit:";

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the request through without quota headers.
    #[default]
    Open,
    /// Reject the request with 503.
    Closed,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub limit: u64,
    pub timeframe: Duration,
    pub whitelist_paths: Vec<String>,
    pub whitelist_ips: HashSet<String>,
    pub failure_policy: FailurePolicy,
}

impl RateLimitConfig {
    pub fn new(limit: u64, timeframe: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if timeframe.as_secs() == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            limit,
            timeframe,
            ..Self::default()
        })
    }

    pub fn with_whitelist_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_whitelist_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            timeframe: Duration::from_secs(60),
            whitelist_paths: vec!["/api/v1/health".to_string(), "/ping".to_string()],
            whitelist_ips: ["127.0.0.1", "::1"].into_iter().map(String::from).collect(),
            failure_policy: FailurePolicy::Open,
        }
    }
}

// Quota snapshot for one request, rendered into the X-RateLimit-* headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub count: u64,
    pub reset_at: i64, // unix seconds
}

impl Quota {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining()));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Whitelisted path or client, or limiter disabled. Nothing was counted.
    Exempt,
    Admitted(Quota),
    Limited(Quota),
    /// Store failed under `FailurePolicy::Open`.
    Degraded,
    /// Store failed under `FailurePolicy::Closed`.
    Unavailable,
}

// Fixed-window limiter keyed by client address
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn SharedStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn SharedStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_exempt(&self, path: &str, client: &str) -> bool {
        !self.config.enabled
            || self
                .config
                .whitelist_paths
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
            || self.config.whitelist_ips.contains(client)
    }

    /// Counts the request against `client`'s window and decides whether it may proceed.
    pub async fn check(&self, path: &str, client: &str) -> Admission {
        if self.is_exempt(path, client) {
            return Admission::Exempt;
        }

        match self.increment(client).await {
            Ok(count) => {
                let quota = Quota {
                    limit: self.config.limit,
                    count,
                    reset_at: chrono::Utc::now().timestamp() + self.config.timeframe.as_secs() as i64,
                };
                if count > self.config.limit {
                    RATE_LIMITED_TOTAL.inc();
                    tracing::debug!(client, count, limit = self.config.limit, "rate limit exceeded");
                    Admission::Limited(quota)
                } else {
                    Admission::Admitted(quota)
                }
            }
            Err(e) => {
                RATE_LIMIT_STORE_ERRORS.inc();
                tracing::warn!(client, error = %e, policy = ?self.config.failure_policy, "rate limit store failure");
                match self.config.failure_policy {
                    FailurePolicy::Open => Admission::Degraded,
                    FailurePolicy::Closed => Admission::Unavailable,
                }
            }
        }
    }

    async fn increment(&self, client: &str) -> Result<u64, StoreError> {
        let key = format!("{KEY_PREFIX}{client}");
        self.store.incr_window(&key, self.config.timeframe).await
    }

    pub fn limited_response(&self) -> Response {
        let body = serde_json::json!({
            "error": "Too many requests",
            "detail": format!(
                "Request limit of {} per {} seconds exceeded. Please wait before trying again.",
                self.config.limit,
                self.config.timeframe.as_secs()
            ),
            "limit": self.config.limit,
            "window_seconds": self.config.timeframe.as_secs(),
        });
        (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
    }
}

fn unavailable_response() -> Response {
    let body = serde_json::json!({ "error": "Rate limiter unavailable" });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

// Source address of the connection, or "unknown" when the server was not
// started with connect info.
pub fn client_identifier(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_identifier(&request);
    let admission = limiter.check(request.uri().path(), &client).await;

    match admission {
        Admission::Exempt | Admission::Degraded => next.run(request).await,
        Admission::Admitted(quota) => {
            let mut response = next.run(request).await;
            quota.apply_headers(response.headers_mut());
            response
        }
        Admission::Limited(quota) => {
            let mut response = limiter.limited_response();
            quota.apply_headers(response.headers_mut());
            response
        }
        Admission::Unavailable => unavailable_response(),
    }
}
