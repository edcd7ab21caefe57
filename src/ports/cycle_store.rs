//! Cycle store port.
//!
//! Defines the contract for persisting OrderCycle aggregates and for
//! observing their committed changes.
//!
//! # Design
//!
//! - **Compare-and-swap writes**: All mutations of an existing cycle go
//!   through [`CycleStore::transact`], which re-reads, applies the caller's
//!   closure, and commits only if the aggregate's version is unchanged.
//!   The closure must therefore be safe to re-run.
//! - **Snapshot fan-out**: Every committed change is broadcast to
//!   subscribers as a full aggregate snapshot. Slow subscribers lose
//!   intermediate snapshots, never the stream.

use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{CycleId, DomainError, GroupId, Timestamp};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// What a [`CycleStore::transact`] closure decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Persist the mutated aggregate and notify subscribers.
    Commit,
    /// Discard the mutation; the stored aggregate is left untouched.
    Noop,
}

/// Mutation applied to an aggregate inside [`CycleStore::transact`].
///
/// May run more than once when a concurrent write forces a retry, so it
/// must overwrite, not accumulate, any state it captures.
pub type Mutator<'a> =
    &'a mut (dyn FnMut(&mut OrderCycle) -> Result<TxOutcome, DomainError> + Send);

/// Store port for OrderCycle aggregate persistence.
///
/// Implementations must ensure:
/// - At most one open cycle per group at insert time
/// - Subscriber notification on every committed change
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Find a cycle by its ID.
    ///
    /// Returns `None` if not found.
    async fn get(&self, id: CycleId) -> Result<Option<OrderCycle>, DomainError>;

    /// Persist a brand-new cycle.
    ///
    /// # Errors
    ///
    /// - `OpenCycleExists` if the group already has an open cycle
    /// - `StorageFailure` on persistence failure
    async fn insert(&self, cycle: OrderCycle) -> Result<(), DomainError>;

    /// Find the open (collecting or payment_window) cycle for a group.
    ///
    /// Returns `None` if the group has no open cycle.
    async fn find_open_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Option<OrderCycle>, DomainError>;

    /// List open cycles whose next deadline is at or before `now`.
    ///
    /// Ordered by deadline ascending, capped at `limit`. Used by the
    /// deadline worker to find cycles that need closing.
    async fn list_due(&self, now: Timestamp, limit: u32) -> Result<Vec<OrderCycle>, DomainError>;

    /// Atomically mutate a stored cycle.
    ///
    /// Reads the cycle, applies `mutate`, and commits under optimistic
    /// concurrency control, retrying the closure on version conflicts.
    /// Returns the aggregate as committed (or as read, for a `Noop`).
    ///
    /// # Errors
    ///
    /// - `CycleNotFound` if the cycle doesn't exist
    /// - `InvariantViolation` if the mutation corrupted the aggregate
    /// - `StorageFailure` if the conflict retries are exhausted
    /// - Any error the closure itself returns
    async fn transact(&self, id: CycleId, mutate: Mutator<'_>) -> Result<OrderCycle, DomainError>;

    /// Subscribe to committed snapshots of one cycle.
    ///
    /// The receiver yields every committed state of the aggregate from
    /// subscription onward. A lagged receiver observes `RecvError::Lagged`
    /// and can resume with the latest snapshot.
    fn subscribe(&self, id: CycleId) -> broadcast::Receiver<OrderCycle>;
}
