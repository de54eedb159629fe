use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::access::UserId;
use crate::error::StoreError;
use crate::store::SharedStore;

const KEY_PREFIX: &str = "password_reset:";

// Single-use password reset tokens kept in the shared store, so every
// process behind the load balancer sees the same set.
#[derive(Clone)]
pub struct ResetTokenStore {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl ResetTokenStore {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, user_id: UserId) -> Result<String, StoreError> {
        let token = Uuid::new_v4().simple().to_string();
        self.store
            .set(&Self::key(&token), user_id.to_string(), Some(self.ttl))
            .await?;
        Ok(token)
    }

    /// Consumes `token`, returning the user it was issued for.
    ///
    /// `None` for unknown, expired or already used tokens.
    pub async fn redeem(&self, token: &str) -> Result<Option<UserId>, StoreError> {
        let Some(raw) = self.store.take(&Self::key(token)).await? else {
            return Ok(None);
        };
        Ok(raw.parse().ok())
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        self.store.delete(&Self::key(token)).await
    }

    fn key(token: &str) -> String {
        format!("{KEY_PREFIX}{token}")
    }
}
