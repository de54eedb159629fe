use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{Principal, Role, UserId};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("expected 'Authorization: Bearer <token>'")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token rejected: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("subject '{0}' is not a user id")]
    BadSubject(String),

    #[error("could not sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Access token claims. `sub` carries the user id as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// HS256 access tokens shared with the user service.
pub struct BearerAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl BearerAuth {
    pub fn new(secret: &str) -> Self {
        // exp is required and checked, with the library's default 60s leeway
        let validation = Validation::new(Algorithm::HS256);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, principal: &Principal, ttl: Duration) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: principal.id.to_string(),
            role: principal.role,
            exp: now + ttl.as_secs(),
            iat: Some(now),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e),
            }
        })?;

        let claims = data.claims;
        let id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::BadSubject(claims.sub.clone()))?;
        Ok(Principal::new(id, claims.role))
    }

    // Verifies the value of an Authorization header
    pub fn authenticate(&self, header: &HeaderValue) -> Result<Principal, TokenError> {
        let value = header.to_str().map_err(|_| TokenError::Malformed)?;
        let (scheme, token) = value.trim().split_once(' ').ok_or(TokenError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
            return Err(TokenError::Malformed);
        }
        self.verify(token.trim())
    }
}

// No Authorization header leaves the request anonymous; a bad token is a 401
// straight away.
pub async fn bearer_auth(
    State(auth): State<Arc<BearerAuth>>,
    mut request: Request,
    next: Next,
) -> Response {
    let verdict = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| auth.authenticate(value));

    match verdict {
        None => next.run(request).await,
        Some(Ok(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Some(Err(e)) => {
            tracing::info!(error = %e, path = %request.uri().path(), "bearer token rejected");
            AppError::Unauthorized.into_response()
        }
    }
}
