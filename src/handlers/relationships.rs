use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use std::sync::Arc;

use crate::access::{Action, Guard, Principal, ResourceType, UserId};
use crate::error::AppError;
use crate::models::{RelationshipFilter, UpsertRelationshipRequest};
use crate::relationships::Relationship;
use crate::state::AppState;

const MANAGE_RELATIONSHIPS: Guard = Guard::new(ResourceType::Relationships, Action::Write);
const READ_USERS: Guard = Guard::new(ResourceType::Users, Action::Read);

const HELPERS_CACHE_PREFIX: &str = "helpers_of:";

pub async fn upsert_relationship_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<UpsertRelationshipRequest>,
) -> Result<Json<Relationship>, AppError> {
    MANAGE_RELATIONSHIPS.check(&state.access, &principal, None).await?;

    if request.user_id == request.helper_id {
        return Err(AppError::BadRequest(
            "a user cannot be assigned as their own helper".to_string(),
        ));
    }

    let record = state
        .relationships
        .upsert(request.user_id, request.helper_id, request.status);
    tracing::info!(
        user_id = record.user_id,
        helper_id = record.helper_id,
        status = ?record.status,
        by = principal.id,
        "relationship updated"
    );

    // listings for this user are stale now
    let prefix = format!("{HELPERS_CACHE_PREFIX}{}:", request.user_id);
    if let Err(e) = state.cache.invalidate_prefix(&prefix).await {
        tracing::warn!(%prefix, error = %e, "failed to invalidate helper listings");
    }

    Ok(Json(record))
}

pub async fn list_helpers_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(user_id): Path<UserId>,
    filter: Result<Query<RelationshipFilter>, QueryRejection>,
) -> Result<Json<Vec<Relationship>>, AppError> {
    READ_USERS.check(&state.access, &principal, Some(user_id)).await?;
    let Query(filter) = filter?;

    let status_key = filter.status.map_or("any", |s| s.as_str());
    let key = format!("{HELPERS_CACHE_PREFIX}{user_id}:{status_key}");

    let helpers = state
        .cache
        .get_or_insert_with(&key, None, || async {
            Ok::<_, AppError>(state.relationships.helpers_for_user(user_id, filter.status))
        })
        .await?;

    Ok(Json(helpers))
}
