//! In-memory group directory.
//!
//! Group membership is owned by a separate system in production; this
//! adapter stands in for it in tests and development, seeded through
//! [`InMemoryGroupDirectory::add_group`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{CycleId, DomainError, ErrorCode, GroupId, UserId};
use crate::ports::GroupDirectory;

/// In-memory implementation of [`GroupDirectory`].
///
/// # Panics
///
/// Methods panic if an internal lock is poisoned.
pub struct InMemoryGroupDirectory {
    members: RwLock<HashMap<GroupId, Vec<UserId>>>,
    current: RwLock<HashMap<GroupId, CycleId>>,
}

impl InMemoryGroupDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            current: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a group with its member list.
    pub fn add_group(&self, group_id: GroupId, members: Vec<UserId>) {
        self.members
            .write()
            .expect("InMemoryGroupDirectory: members lock poisoned")
            .insert(group_id, members);
    }
}

impl Default for InMemoryGroupDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupDirectory for InMemoryGroupDirectory {
    async fn members(&self, group_id: GroupId) -> Result<Option<Vec<UserId>>, DomainError> {
        let members = self
            .members
            .read()
            .expect("InMemoryGroupDirectory: members lock poisoned");
        Ok(members.get(&group_id).cloned())
    }

    async fn current_cycle(&self, group_id: GroupId) -> Result<Option<CycleId>, DomainError> {
        let current = self
            .current
            .read()
            .expect("InMemoryGroupDirectory: current lock poisoned");
        Ok(current.get(&group_id).copied())
    }

    async fn set_current_cycle(
        &self,
        group_id: GroupId,
        cycle_id: Option<CycleId>,
    ) -> Result<(), DomainError> {
        {
            let members = self
                .members
                .read()
                .expect("InMemoryGroupDirectory: members lock poisoned");
            if !members.contains_key(&group_id) {
                return Err(DomainError::new(
                    ErrorCode::GroupNotFound,
                    format!("Group {} not found", group_id),
                ));
            }
        }
        let mut current = self
            .current
            .write()
            .expect("InMemoryGroupDirectory: current lock poisoned");
        match cycle_id {
            Some(id) => {
                current.insert(group_id, id);
            }
            None => {
                current.remove(&group_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[tokio::test]
    async fn unknown_group_has_no_member_list() {
        let directory = InMemoryGroupDirectory::new();
        assert!(directory.members(GroupId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeded_group_lists_its_members() {
        let directory = InMemoryGroupDirectory::new();
        let group_id = GroupId::new();
        directory.add_group(group_id, vec![user("alice"), user("bob")]);

        let members = directory.members(group_id).await.unwrap().unwrap();
        assert_eq!(members, vec![user("alice"), user("bob")]);
    }

    #[tokio::test]
    async fn empty_group_is_known_but_memberless() {
        let directory = InMemoryGroupDirectory::new();
        let group_id = GroupId::new();
        directory.add_group(group_id, vec![]);

        let members = directory.members(group_id).await.unwrap();
        assert_eq!(members, Some(vec![]));
    }

    #[tokio::test]
    async fn cycle_pointer_can_be_set_and_cleared() {
        let directory = InMemoryGroupDirectory::new();
        let group_id = GroupId::new();
        let cycle_id = CycleId::new();
        directory.add_group(group_id, vec![user("alice")]);

        assert!(directory.current_cycle(group_id).await.unwrap().is_none());

        directory
            .set_current_cycle(group_id, Some(cycle_id))
            .await
            .unwrap();
        assert_eq!(
            directory.current_cycle(group_id).await.unwrap(),
            Some(cycle_id)
        );

        directory.set_current_cycle(group_id, None).await.unwrap();
        assert!(directory.current_cycle(group_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cycle_pointer_for_unknown_group_fails() {
        let directory = InMemoryGroupDirectory::new();

        let err = directory
            .set_current_cycle(GroupId::new(), Some(CycleId::new()))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::GroupNotFound);
    }
}
