use axum::{Json, extract::State};
use std::sync::Arc;

use crate::access::Principal;
use crate::cache::make_cache_key;
use crate::error::AppError;
use crate::models::{AuthorizeRequest, AuthorizeResponse, PermissionRow, PermissionsResponse};
use crate::state::AppState;

// Policy decision point: answers instead of enforcing, so a deny is still a 200
pub async fn authorize_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<AuthorizeRequest>,
) -> Json<AuthorizeResponse> {
    let decision = state
        .access
        .authorize(&principal, request.resource, request.action, request.owner_id)
        .await;

    Json(match decision {
        Ok(()) => AuthorizeResponse {
            allowed: true,
            reason: None,
            detail: None,
        },
        Err(denial) => AuthorizeResponse {
            allowed: false,
            reason: Some(denial.reason().to_string()),
            detail: Some(denial.to_string()),
        },
    })
}

// What the caller's role may do, straight from the permission matrix
pub async fn permissions_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<PermissionsResponse>, AppError> {
    let key = make_cache_key("permissions", &principal.role)?;

    let permissions = state
        .cache
        .get_or_insert_with(&key, None, || async {
            let rows = state
                .access
                .matrix()
                .rows_for_role(principal.role)
                .into_iter()
                .map(|(resource, actions)| PermissionRow { resource, actions })
                .collect::<Vec<_>>();
            Ok::<_, AppError>(rows)
        })
        .await?;

    Ok(Json(PermissionsResponse {
        role: principal.role,
        permissions,
    }))
}
