//! Suspension store port.
//!
//! Defines the contract for persisting suspension records and their
//! append-only audit trail. One record per user; re-suspension overwrites
//! the record and appends to the audit.

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::suspension::{SuspensionAudit, SuspensionRecord};
use async_trait::async_trait;

/// Store port for suspension records.
#[async_trait]
pub trait SuspensionStore: Send + Sync {
    /// Find the suspension record for a user.
    ///
    /// Returns `None` if the user has never been suspended. A returned
    /// record may have lapsed; callers decide with
    /// [`SuspensionRecord::is_active`].
    async fn get(&self, user_id: &UserId) -> Result<Option<SuspensionRecord>, DomainError>;

    /// Insert or replace the record for `record.user_id()`.
    ///
    /// # Errors
    ///
    /// - `StorageFailure` on persistence failure
    async fn upsert(&self, record: SuspensionRecord) -> Result<(), DomainError>;

    /// Remove a user's suspension record, if any.
    ///
    /// Lazy expiry: readers that find a lapsed record drop it here; there
    /// is no background sweep. The audit trail is untouched.
    ///
    /// # Errors
    ///
    /// - `StorageFailure` on persistence failure
    async fn clear(&self, user_id: &UserId) -> Result<(), DomainError>;

    /// Append one entry to the audit trail.
    ///
    /// # Errors
    ///
    /// - `StorageFailure` on persistence failure
    async fn append_audit(&self, entry: SuspensionAudit) -> Result<(), DomainError>;

    /// List a user's audit entries, oldest first.
    async fn audit_for_user(&self, user_id: &UserId) -> Result<Vec<SuspensionAudit>, DomainError>;
}
