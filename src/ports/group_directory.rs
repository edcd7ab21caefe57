//! Group directory port.
//!
//! Group membership is managed by a separate system; this port is the
//! read/write seam the cycle engine needs from it - who belongs to a
//! group, and which cycle (if any) is the group's current one.

use crate::domain::foundation::{CycleId, DomainError, GroupId, UserId};
use async_trait::async_trait;

/// Directory port for group membership and the per-group cycle pointer.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// List the members of a group.
    ///
    /// Returns `None` if the group doesn't exist.
    async fn members(&self, group_id: GroupId) -> Result<Option<Vec<UserId>>, DomainError>;

    /// The group's current cycle pointer, if one is set.
    async fn current_cycle(&self, group_id: GroupId) -> Result<Option<CycleId>, DomainError>;

    /// Set or clear the group's current cycle pointer.
    ///
    /// # Errors
    ///
    /// - `GroupNotFound` if the group doesn't exist
    /// - `StorageFailure` on persistence failure
    async fn set_current_cycle(
        &self,
        group_id: GroupId,
        cycle_id: Option<CycleId>,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn group_directory_is_object_safe() {
        fn _accepts_dyn(_directory: &dyn GroupDirectory) {}
    }
}
