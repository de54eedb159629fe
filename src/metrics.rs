use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Histogram, register_counter, register_counter_vec, register_histogram,
};
use std::time::Instant;

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("gateway_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref RATE_LIMIT_STORE_ERRORS: Counter = register_counter!(
        "gateway_rate_limit_store_errors_total",
        "Rate limiter checks that failed to reach the counter store"
    )
    .unwrap();
    pub static ref ACCESS_DENIED: CounterVec = register_counter_vec!(
        "gateway_access_denied_total",
        "Authorization denials by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("gateway_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("gateway_cache_misses_total", "Total cache misses").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
}

// Outermost layer: counts every request and times it
pub async fn track_requests(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let response = next.run(request).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}
