use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::access::UserId;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Active,
    Inactive,
    Pending,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Inactive => "inactive",
            RelationshipStatus::Pending => "pending",
        }
    }
}

// Assignment of a helper to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub user_id: UserId,
    pub helper_id: UserId,
    pub status: RelationshipStatus,
    pub updated_at: DateTime<Utc>,
}

/// Point query used by access control for delegated ownership.
#[async_trait]
pub trait RelationshipLookup: Send + Sync {
    async fn is_active(&self, helper_id: UserId, user_id: UserId) -> Result<bool, StoreError>;
}

// In-memory relationship table, one record per (user, helper) pair
#[derive(Default)]
pub struct RelationshipRegistry {
    records: DashMap<(UserId, UserId), Relationship>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Insert or replace the record for this pair
    pub fn upsert(&self, user_id: UserId, helper_id: UserId, status: RelationshipStatus) -> Relationship {
        let record = Relationship {
            user_id,
            helper_id,
            status,
            updated_at: Utc::now(),
        };
        self.records.insert((user_id, helper_id), record.clone());
        record
    }

    pub fn get(&self, user_id: UserId, helper_id: UserId) -> Option<Relationship> {
        self.records.get(&(user_id, helper_id)).map(|r| r.clone())
    }

    // None when the pair has no record yet
    pub fn update_status(
        &self,
        user_id: UserId,
        helper_id: UserId,
        status: RelationshipStatus,
    ) -> Option<Relationship> {
        let mut record = self.records.get_mut(&(user_id, helper_id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    pub fn helpers_for_user(
        &self,
        user_id: UserId,
        status: Option<RelationshipStatus>,
    ) -> Vec<Relationship> {
        self.collect(|r| r.user_id == user_id && status.is_none_or(|s| r.status == s))
    }

    pub fn users_for_helper(
        &self,
        helper_id: UserId,
        status: Option<RelationshipStatus>,
    ) -> Vec<Relationship> {
        self.collect(|r| r.helper_id == helper_id && status.is_none_or(|s| r.status == s))
    }

    fn collect(&self, keep: impl Fn(&Relationship) -> bool) -> Vec<Relationship> {
        let mut out: Vec<Relationship> = self
            .records
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|r| (r.user_id, r.helper_id));
        out
    }
}

#[async_trait]
impl RelationshipLookup for RelationshipRegistry {
    async fn is_active(&self, helper_id: UserId, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self
            .records
            .get(&(user_id, helper_id))
            .is_some_and(|r| r.status == RelationshipStatus::Active))
    }
}
