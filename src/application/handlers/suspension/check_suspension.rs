//! CheckSuspensionHandler - Query handler for a user's suspension status.
//!
//! Answers "may this user place orders right now" plus the detail a caller
//! needs to explain a refusal: when the block lifts and how many times the
//! user has defaulted.

use std::sync::Arc;

use tracing::debug;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::SuspensionStore;

/// Query for one user's suspension status.
#[derive(Debug, Clone)]
pub struct CheckSuspensionQuery {
    /// User to check.
    pub user_id: UserId,
}

/// A user's suspension status at query time.
///
/// A lapsed suspension is cleared on read and reports as if the user was
/// never suspended; the audit trail keeps the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspensionStatus {
    /// Whether the user is currently barred from ordering.
    pub suspended: bool,
    /// End of the most recent suspension window, if the user was ever
    /// suspended.
    pub suspended_until: Option<Timestamp>,
    /// Lifetime number of suspensions.
    pub suspension_count: u32,
}

/// Error type for suspension checks.
#[derive(Debug)]
pub enum CheckSuspensionError {
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for CheckSuspensionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckSuspensionError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CheckSuspensionError {}

impl From<DomainError> for CheckSuspensionError {
    fn from(err: DomainError) -> Self {
        CheckSuspensionError::Domain(err)
    }
}

/// Handler for checking suspension status.
pub struct CheckSuspensionHandler {
    suspension_store: Arc<dyn SuspensionStore>,
}

impl CheckSuspensionHandler {
    pub fn new(suspension_store: Arc<dyn SuspensionStore>) -> Self {
        Self { suspension_store }
    }

    pub async fn handle(
        &self,
        query: CheckSuspensionQuery,
    ) -> Result<SuspensionStatus, CheckSuspensionError> {
        let now = Timestamp::now();

        let status = match self.suspension_store.get(&query.user_id).await? {
            Some(record) if record.is_active(now) => SuspensionStatus {
                suspended: true,
                suspended_until: Some(record.suspended_until()),
                suspension_count: record.suspension_count(),
            },
            Some(record) => {
                // Lazy expiry: drop the lapsed record on the way out.
                self.suspension_store.clear(&query.user_id).await?;
                debug!(
                    user_id = %query.user_id,
                    lapsed_at = %record.suspended_until(),
                    "Cleared lapsed suspension"
                );
                SuspensionStatus {
                    suspended: false,
                    suspended_until: None,
                    suspension_count: 0,
                }
            }
            None => SuspensionStatus {
                suspended: false,
                suspended_until: None,
                suspension_count: 0,
            },
        };

        Ok(status)
    }
}
