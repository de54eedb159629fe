use axum::{Json, extract::State};
use std::sync::Arc;

use crate::access::{Denial, Principal};
use crate::error::AppError;
use crate::models::{
    PasswordResetConfirm, PasswordResetConfirmed, PasswordResetIssued, PasswordResetRequest,
};
use crate::password_policy::PasswordPolicy;
use crate::state::AppState;

// Issues a reset token. Delivering it (mail) is up to the caller; only the
// account owner or an admin may ask for one.
pub async fn issue_reset_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetIssued>, AppError> {
    if !principal.is_admin() && principal.id != request.user_id {
        return Err(Denial::OwnershipViolation.into());
    }

    let token = state.reset_tokens.issue(request.user_id).await?;
    tracing::info!(user_id = request.user_id, by = principal.id, "password reset token issued");

    Ok(Json(PasswordResetIssued {
        token,
        expires_in_seconds: state.reset_tokens.ttl().as_secs(),
    }))
}

// The token is the credential here, no principal needed
pub async fn confirm_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetConfirm>,
) -> Result<Json<PasswordResetConfirmed>, AppError> {
    // check the password before burning the token
    state
        .password_policy
        .validate(&request.new_password)
        .map_err(|violations| {
            AppError::Validation(violations.iter().map(ToString::to_string).collect())
        })?;

    let user_id = state
        .reset_tokens
        .redeem(&request.token)
        .await?
        .ok_or_else(|| AppError::BadRequest("invalid or expired reset token".to_string()))?;

    tracing::info!(user_id, "password reset confirmed");
    Ok(Json(PasswordResetConfirmed { user_id }))
}

pub async fn password_policy_handler(State(state): State<Arc<AppState>>) -> Json<PasswordPolicy> {
    Json(state.password_policy.clone())
}
