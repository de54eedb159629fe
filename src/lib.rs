pub mod access;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod password_policy;
pub mod rate_limit;
pub mod relationships;
pub mod reset_tokens;
pub mod state;
pub mod store;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use std::sync::Arc;

use crate::handlers::*;
use crate::metrics::track_requests;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

// Every route, the fallback included, sits behind the rate limiter.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/authorize", post(authorize_handler))
        .route("/api/v1/permissions", get(permissions_handler))
        .route("/api/v1/relationships", put(upsert_relationship_handler))
        .route("/api/v1/users/{user_id}/helpers", get(list_helpers_handler))
        .route("/api/v1/users/{user_id}/tasks/{task_id}", put(update_task_handler))
        .route(
            "/api/v1/users/{user_id}/recipe-requests/{request_id}",
            delete(delete_recipe_request_handler),
        )
        .route("/api/v1/password-policy", get(password_policy_handler))
        .route("/api/v1/password-reset", post(issue_reset_handler))
        .route("/api/v1/password-reset/confirm", post(confirm_reset_handler))
        .fallback(not_found_handler)
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit_middleware))
        .layer(from_fn(track_requests))
        .with_state(state)
}
