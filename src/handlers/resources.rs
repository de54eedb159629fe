use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::access::{Action, Guard, Principal, ResourceType, UserId};
use crate::error::AppError;
use crate::models::AuthorizedAction;
use crate::state::AppState;

// Owner-scoped routes. The owner comes from the path, so a helper only gets
// through when actively assigned to that user. Persisting the change belongs
// to the service behind the gateway.

const TASK_WRITE: Guard = Guard::new(ResourceType::Tasks, Action::Write);
const RECIPE_REQUEST_DELETE: Guard = Guard::new(ResourceType::RecipeRequests, Action::Delete);

pub async fn update_task_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((user_id, task_id)): Path<(UserId, i64)>,
) -> Result<Json<AuthorizedAction>, AppError> {
    TASK_WRITE.check(&state.access, &principal, Some(user_id)).await?;

    Ok(Json(acknowledge(TASK_WRITE, user_id, task_id, &principal)))
}

pub async fn delete_recipe_request_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((user_id, request_id)): Path<(UserId, i64)>,
) -> Result<Json<AuthorizedAction>, AppError> {
    RECIPE_REQUEST_DELETE
        .check(&state.access, &principal, Some(user_id))
        .await?;

    Ok(Json(acknowledge(RECIPE_REQUEST_DELETE, user_id, request_id, &principal)))
}

fn acknowledge(guard: Guard, owner_id: UserId, resource_id: i64, principal: &Principal) -> AuthorizedAction {
    tracing::debug!(
        resource = %guard.resource,
        action = %guard.action,
        owner_id,
        resource_id,
        acted_by = principal.id,
        "authorized"
    );
    AuthorizedAction {
        resource: guard.resource,
        action: guard.action,
        owner_id,
        resource_id,
        acted_by: principal.id,
    }
}
