use std::sync::Arc;
use thiserror::Error;

use super::{Action, PermissionMatrix, Principal, ResourceType, Role, UserId};
use crate::error::AppError;
use crate::metrics::ACCESS_DENIED;
use crate::relationships::RelationshipLookup;

/// Why a request was refused.
///
/// All three reach the client as 403; the distinction is for logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("no permission definition for resource '{0}'")]
    NoPermissionDefinition(ResourceType),

    #[error("role '{role}' may not {action} resource '{resource}'")]
    RoleNotPermitted {
        role: Role,
        resource: ResourceType,
        action: Action,
    },

    #[error("not allowed to modify a resource owned by another user")]
    OwnershipViolation,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::NoPermissionDefinition(_) => "no_permission_definition",
            Denial::RoleNotPermitted { .. } => "role_not_permitted",
            Denial::OwnershipViolation => "ownership_violation",
        }
    }
}

#[derive(Clone)]
pub struct AccessControl {
    matrix: Arc<PermissionMatrix>,
    relationships: Arc<dyn RelationshipLookup>,
}

impl AccessControl {
    pub fn new(matrix: PermissionMatrix, relationships: Arc<dyn RelationshipLookup>) -> Self {
        Self {
            matrix: Arc::new(matrix),
            relationships,
        }
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    /// Decides whether `principal` may perform `action` on `resource`.
    ///
    /// `owner_id` is the user owning the addressed resource, when the route
    /// names one. Only the delegated-ownership branch does any I/O; a failed
    /// relationship lookup counts as "no active relationship".
    pub async fn evaluate(
        &self,
        principal: &Principal,
        resource: ResourceType,
        action: Action,
        owner_id: Option<UserId>,
    ) -> Result<(), Denial> {
        if principal.is_admin() {
            return Ok(());
        }

        let roles = self
            .matrix
            .roles_for(resource)
            .ok_or(Denial::NoPermissionDefinition(resource))?;

        let not_permitted = Denial::RoleNotPermitted {
            role: principal.role,
            resource,
            action,
        };
        let allowed = roles.get(&principal.role).ok_or_else(|| not_permitted.clone())?;
        if !allowed.contains(&action) {
            return Err(not_permitted);
        }

        match owner_id {
            Some(owner_id) if action.is_mutation() && owner_id != principal.id => {
                if principal.role == Role::Helper
                    && resource.is_delegable()
                    && self.has_active_relationship(principal.id, owner_id).await
                {
                    Ok(())
                } else {
                    Err(Denial::OwnershipViolation)
                }
            }
            _ => Ok(()),
        }
    }

    async fn has_active_relationship(&self, helper_id: UserId, user_id: UserId) -> bool {
        match self.relationships.is_active(helper_id, user_id).await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(helper_id, user_id, error = %e, "relationship lookup failed, treating as inactive");
                false
            }
        }
    }

    // evaluate + logging and metrics, for handlers
    pub async fn authorize(
        &self,
        principal: &Principal,
        resource: ResourceType,
        action: Action,
        owner_id: Option<UserId>,
    ) -> Result<(), Denial> {
        self.evaluate(principal, resource, action, owner_id)
            .await
            .inspect_err(|denial| {
                ACCESS_DENIED.with_label_values(&[denial.reason()]).inc();
                tracing::info!(
                    principal = principal.id,
                    role = %principal.role,
                    %resource,
                    %action,
                    owner_id,
                    reason = denial.reason(),
                    "access denied"
                );
            })
    }
}

/// Per-route authorization check with the resource and action fixed up front.
///
/// ```ignore
/// const TASK_WRITE: Guard = Guard::new(ResourceType::Tasks, Action::Write);
/// TASK_WRITE.check(&state.access, &principal, Some(user_id)).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub resource: ResourceType,
    pub action: Action,
}

impl Guard {
    pub const fn new(resource: ResourceType, action: Action) -> Self {
        Self { resource, action }
    }

    pub async fn check(
        &self,
        access: &AccessControl,
        principal: &Principal,
        owner_id: Option<UserId>,
    ) -> Result<(), AppError> {
        access
            .authorize(principal, self.resource, self.action, owner_id)
            .await
            .map_err(AppError::from)
    }
}
