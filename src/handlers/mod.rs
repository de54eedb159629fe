mod authorize;
mod health;
mod metrics;
mod password_reset;
mod relationships;
mod resources;

pub use authorize::{authorize_handler, permissions_handler};
pub use health::{health_handler, not_found_handler};
pub use metrics::metrics_handler;
pub use password_reset::{confirm_reset_handler, issue_reset_handler, password_policy_handler};
pub use relationships::{list_helpers_handler, upsert_relationship_handler};
pub use resources::{delete_recipe_request_handler, update_task_handler};
