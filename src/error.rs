use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::access::Denial;

// Errors coming out of the shared store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("value at '{0}' is not a counter")]
    NotACounter(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Bad startup configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rate limit must be greater than zero")]
    ZeroLimit,

    #[error("rate limit window must be greater than zero seconds")]
    ZeroWindow,
}

/// Errors returned from handlers, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error(transparent)]
    Forbidden(#[from] Denial),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("validation failed")]
    Validation(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Unauthorized => serde_json::json!({
                "error": "Unauthorized",
                "detail": self.to_string(),
            }),
            AppError::Forbidden(denial) => serde_json::json!({
                "error": "Forbidden",
                "detail": denial.to_string(),
            }),
            AppError::Validation(errors) => serde_json::json!({
                "error": "Unprocessable entity",
                "detail": errors,
            }),
            AppError::Store(e) => {
                // don't leak store internals to the client
                tracing::error!(error = %e, "store error while handling request");
                serde_json::json!({
                    "error": "Internal server error",
                })
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) => serde_json::json!({
                "error": status.canonical_reason().unwrap_or("Error"),
                "detail": msg,
            }),
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
