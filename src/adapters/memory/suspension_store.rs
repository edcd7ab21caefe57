//! In-memory suspension store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::suspension::{SuspensionAudit, SuspensionRecord};
use crate::ports::SuspensionStore;

/// In-memory implementation of [`SuspensionStore`].
///
/// One record per user plus an append-only audit trail, both held in
/// process memory.
///
/// # Panics
///
/// Methods panic if an internal lock is poisoned.
pub struct InMemorySuspensionStore {
    records: RwLock<HashMap<UserId, SuspensionRecord>>,
    audit: RwLock<Vec<SuspensionAudit>>,
}

impl InMemorySuspensionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemorySuspensionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuspensionStore for InMemorySuspensionStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<SuspensionRecord>, DomainError> {
        let records = self
            .records
            .read()
            .expect("InMemorySuspensionStore: records lock poisoned");
        Ok(records.get(user_id).cloned())
    }

    async fn upsert(&self, record: SuspensionRecord) -> Result<(), DomainError> {
        let mut records = self
            .records
            .write()
            .expect("InMemorySuspensionStore: records lock poisoned");
        records.insert(record.user_id().clone(), record);
        Ok(())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), DomainError> {
        let mut records = self
            .records
            .write()
            .expect("InMemorySuspensionStore: records lock poisoned");
        records.remove(user_id);
        Ok(())
    }

    async fn append_audit(&self, entry: SuspensionAudit) -> Result<(), DomainError> {
        let mut audit = self
            .audit
            .write()
            .expect("InMemorySuspensionStore: audit lock poisoned");
        audit.push(entry);
        Ok(())
    }

    async fn audit_for_user(&self, user_id: &UserId) -> Result<Vec<SuspensionAudit>, DomainError> {
        let audit = self
            .audit
            .read()
            .expect("InMemorySuspensionStore: audit lock poisoned");
        Ok(audit
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect())
    }
}
