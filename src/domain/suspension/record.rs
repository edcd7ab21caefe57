//! Suspension record entity.
//!
//! A suspension is a time-boxed restriction on a user who defaulted on
//! payment. Whether a user is suspended is never stored as a flag; it is
//! always computed from `suspended_until` against the caller's clock, so
//! suspensions lapse without any cleanup job touching the record.

use crate::domain::foundation::{Timestamp, UserId};

/// Suspension record - one row per user, updated on each re-suspension.
///
/// # Invariants
///
/// - `suspension_count` is at least 1
/// - `suspended_until` reflects the most recent suspension only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspensionRecord {
    /// The suspended user.
    user_id: UserId,

    /// The instant the suspension lapses.
    suspended_until: Timestamp,

    /// Why the most recent suspension was imposed.
    reason: String,

    /// How many times this user has been suspended.
    suspension_count: u32,

    /// When the user was first suspended.
    created_at: Timestamp,

    /// When the record last changed.
    updated_at: Timestamp,
}

impl SuspensionRecord {
    /// Creates a first suspension for a user, lasting until `suspended_until`.
    pub fn new(
        user_id: UserId,
        reason: impl Into<String>,
        now: Timestamp,
        suspended_until: Timestamp,
    ) -> Self {
        Self {
            user_id,
            suspended_until,
            reason: reason.into(),
            suspension_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes a record from persistence.
    pub fn reconstitute(
        user_id: UserId,
        suspended_until: Timestamp,
        reason: String,
        suspension_count: u32,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            user_id,
            suspended_until,
            reason,
            suspension_count,
            created_at,
            updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the suspended user's ID.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns when the suspension lapses.
    pub fn suspended_until(&self) -> Timestamp {
        self.suspended_until
    }

    /// Returns the most recent suspension reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns how many times this user has been suspended.
    pub fn suspension_count(&self) -> u32 {
        self.suspension_count
    }

    /// Returns when the user was first suspended.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when the record last changed.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Behavior
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns true while the suspension is in force at `now`.
    ///
    /// A suspension lasts until, exclusive of, `suspended_until`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        now.is_before(&self.suspended_until)
    }

    /// Re-suspends the user until the new `suspended_until`.
    ///
    /// The new window replaces the old one outright, whether or not the
    /// previous suspension had lapsed.
    pub fn extend(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
        suspended_until: Timestamp,
    ) {
        self.suspended_until = suspended_until;
        self.reason = reason.into();
        self.suspension_count += 1;
        self.updated_at = now;
    }

    /// Produces the audit entry describing this record's latest suspension.
    pub fn audit_entry(&self) -> SuspensionAudit {
        SuspensionAudit {
            user_id: self.user_id.clone(),
            reason: self.reason.clone(),
            suspended_until: self.suspended_until,
            recorded_at: self.updated_at,
        }
    }
}

/// Append-only audit entry, one per suspension event.
///
/// The record on its own only keeps the latest window; the audit trail
/// preserves the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspensionAudit {
    /// The suspended user.
    pub user_id: UserId,

    /// Why the suspension was imposed.
    pub reason: String,

    /// The window this suspension ran until.
    pub suspended_until: Timestamp,

    /// When the suspension was recorded.
    pub recorded_at: Timestamp,
}
