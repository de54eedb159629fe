//! Role and ownership based authorization.
//!
//! A static [`PermissionMatrix`] says which role may perform which action on
//! which kind of resource. [`AccessControl`] applies it to a [`Principal`] and
//! layers the ownership rule on top: writes and deletes on somebody else's
//! resource are refused unless a helper is acting for a user they are actively
//! assigned to.

mod bearer;
mod evaluator;
mod matrix;
mod principal;

pub use bearer::{BearerAuth, Claims, TokenError, bearer_auth};
pub use evaluator::{AccessControl, Denial, Guard};
pub use matrix::{Action, PermissionMatrix, ResourceType, Role};
pub use principal::{
    Principal, USER_ID_HEADER, USER_ROLE_HEADER, UserId, identity_headers, principal_from_headers,
};
