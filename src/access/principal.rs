use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

use super::Role;
use crate::error::AppError;

pub type UserId = i64;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller.
///
/// Authentication itself happens upstream; whatever authenticated the request
/// leaves a `Principal` in the request extensions and handlers pull it out
/// through this extractor. A request without one is answered with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}

pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let id = headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<UserId>()
        .ok()?;
    let role = headers.get(USER_ROLE_HEADER)?.to_str().ok()?.parse::<Role>().ok()?;
    Some(Principal::new(id, role))
}

// For deployments behind an authenticating proxy that forwards the caller as
// X-User-Id / X-User-Role. Malformed headers leave the request anonymous, and
// a principal set by an earlier layer is kept.
pub async fn identity_headers(mut request: Request, next: Next) -> Response {
    if request.extensions().get::<Principal>().is_some() {
        return next.run(request).await;
    }
    match principal_from_headers(request.headers()) {
        Some(principal) => {
            request.extensions_mut().insert(principal);
        }
        None if request.headers().contains_key(USER_ID_HEADER) => {
            tracing::debug!("ignoring malformed identity headers");
        }
        None => {}
    }
    next.run(request).await
}
