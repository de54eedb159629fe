use std::sync::Arc;
use std::time::Duration;

use crate::access::{AccessControl, PermissionMatrix};
use crate::cache::Cache;
use crate::password_policy::PasswordPolicy;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::relationships::RelationshipRegistry;
use crate::reset_tokens::ResetTokenStore;
use crate::store::SharedStore;

// app's shared state
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub access: AccessControl,
    pub relationships: Arc<RelationshipRegistry>,
    pub cache: Cache,
    pub reset_tokens: ResetTokenStore,
    pub password_policy: PasswordPolicy,
}

impl AppState {
    // everything shares one store: counters, cache entries and reset tokens
    pub fn new(
        store: Arc<dyn SharedStore>,
        rate_limit: RateLimitConfig,
        cache_ttl: Duration,
        reset_token_ttl: Duration,
    ) -> Self {
        let relationships = Arc::new(RelationshipRegistry::new());
        Self {
            limiter: Arc::new(RateLimiter::new(rate_limit, store.clone())),
            access: AccessControl::new(PermissionMatrix::standard(), relationships.clone()),
            relationships,
            cache: Cache::new(store.clone(), cache_ttl),
            reset_tokens: ResetTokenStore::new(store, reset_token_ttl),
            password_policy: PasswordPolicy::default(),
        }
    }
}
