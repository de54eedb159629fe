use serde::{Deserialize, Serialize};

use crate::access::{Action, ResourceType, Role, UserId};
use crate::relationships::RelationshipStatus;

// Policy decision request: "may I do `action` on `resource` owned by `owner_id`?"
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AuthorizeRequest {
    pub resource: ResourceType,
    pub action: Action,
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PermissionRow {
    pub resource: ResourceType,
    pub actions: Vec<Action>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PermissionsResponse {
    pub role: Role,
    pub permissions: Vec<PermissionRow>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct UpsertRelationshipRequest {
    pub user_id: UserId,
    pub helper_id: UserId,
    #[serde(default = "default_status")]
    pub status: RelationshipStatus,
}

fn default_status() -> RelationshipStatus {
    RelationshipStatus::Active
}

#[derive(Deserialize, Debug, Default)]
pub struct RelationshipFilter {
    pub status: Option<RelationshipStatus>,
}

// Returned by the owner-scoped resource routes once the guard let the call through
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AuthorizedAction {
    pub resource: ResourceType,
    pub action: Action,
    pub owner_id: UserId,
    pub resource_id: i64,
    pub acted_by: UserId,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PasswordResetRequest {
    pub user_id: UserId,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PasswordResetIssued {
    pub token: String,
    pub expires_in_seconds: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PasswordResetConfirmed {
    pub user_id: UserId,
}
