use crate::error::StoreError;
use async_trait::async_trait;
use rpl_core::SymbolTable;
use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// A successfully compiled policy, keyed by its policy id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredPolicy {
    pub policy_id: String,
    pub source: String,
    pub symbol_table: SymbolTable,
    pub artifact: Option<String>,
    pub warnings: Vec<String>,
    pub risk_score: Option<f64>,
    /// Starts at 1; bumped by every update.
    pub version: u32,
    pub updated_at: OffsetDateTime,
}

/// Persistence for compiled policies.
///
/// Implementations must be `Send + Sync` so one store can be shared by the
/// compiler and enforcement services across tasks.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns `Err(StoreError::AlreadyExists)` if the id is taken.
    async fn create(&self, policy: StoredPolicy) -> Result<(), StoreError>;

    async fn get(&self, policy_id: &str) -> Result<Option<StoredPolicy>, StoreError>;

    /// Replace an existing policy; returns the new version.
    async fn update(&self, policy: StoredPolicy) -> Result<u32, StoreError>;

    async fn delete(&self, policy_id: &str) -> Result<(), StoreError>;

    /// Stored policy ids, sorted.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<String, StoredPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        InMemoryPolicyStore::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, policy: StoredPolicy) -> Result<(), StoreError> {
        let mut policies = self.policies.write().await;
        if policies.contains_key(&policy.policy_id) {
            return Err(StoreError::AlreadyExists(policy.policy_id));
        }
        policies.insert(policy.policy_id.clone(), policy);
        Ok(())
    }

    async fn get(&self, policy_id: &str) -> Result<Option<StoredPolicy>, StoreError> {
        Ok(self.policies.read().await.get(policy_id).cloned())
    }

    async fn update(&self, mut policy: StoredPolicy) -> Result<u32, StoreError> {
        let mut policies = self.policies.write().await;
        let existing = policies
            .get(&policy.policy_id)
            .ok_or_else(|| StoreError::NotFound(policy.policy_id.clone()))?;
        policy.version = existing.version + 1;
        let version = policy.version;
        policies.insert(policy.policy_id.clone(), policy);
        Ok(version)
    }

    async fn delete(&self, policy_id: &str) -> Result<(), StoreError> {
        self.policies
            .write()
            .await
            .remove(policy_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(policy_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.policies.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(id: &str) -> StoredPolicy {
        StoredPolicy {
            policy_id: id.to_string(),
            source: String::new(),
            symbol_table: SymbolTable::new(),
            artifact: None,
            warnings: Vec::new(),
            risk_score: None,
            version: 1,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn create_get_update_delete() {
        let store = InMemoryPolicyStore::new();
        store.create(policy("p1")).await.unwrap();
        assert_eq!(
            store.create(policy("p1")).await,
            Err(StoreError::AlreadyExists("p1".into()))
        );
        assert_eq!(store.get("p1").await.unwrap().map(|p| p.version), Some(1));
        assert_eq!(store.update(policy("p1")).await, Ok(2));
        assert_eq!(store.list().await.unwrap(), vec!["p1"]);
        store.delete("p1").await.unwrap();
        assert!(store.get("p1").await.unwrap().is_none());
        assert_eq!(store.delete("p1").await, Err(StoreError::NotFound("p1".into())));
        assert_eq!(
            store.update(policy("p2")).await,
            Err(StoreError::NotFound("p2".into()))
        );
    }
}
