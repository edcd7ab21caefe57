//! SubscribeCycleHandler - Query handler for live cycle observation.
//!
//! Consumers get the current aggregate snapshot plus a receiver of every
//! subsequently committed snapshot. Subscription happens before the read,
//! so no committed change can fall between the snapshot and the stream.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{CycleId, DomainError};
use crate::ports::CycleStore;

/// Query to observe one cycle.
#[derive(Debug, Clone)]
pub struct SubscribeCycleQuery {
    /// Cycle to observe.
    pub cycle_id: CycleId,
}

/// A live view of one cycle.
///
/// `updates` may replay states already reflected in `snapshot`; consumers
/// treat each received value as the latest full state, so replays are
/// harmless. A lagged receiver drops intermediate snapshots, never the
/// subscription.
#[derive(Debug)]
pub struct CycleSubscription {
    /// The cycle's state at subscription time.
    pub snapshot: OrderCycle,
    /// Committed snapshots from here on.
    pub updates: broadcast::Receiver<OrderCycle>,
}

/// Error type for cycle subscription.
#[derive(Debug)]
pub enum SubscribeCycleError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for SubscribeCycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscribeCycleError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            SubscribeCycleError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SubscribeCycleError {}

impl From<DomainError> for SubscribeCycleError {
    fn from(err: DomainError) -> Self {
        SubscribeCycleError::Domain(err)
    }
}

/// Handler for subscribing to cycles.
pub struct SubscribeCycleHandler {
    cycle_store: Arc<dyn CycleStore>,
}

impl SubscribeCycleHandler {
    pub fn new(cycle_store: Arc<dyn CycleStore>) -> Self {
        Self { cycle_store }
    }

    pub async fn handle(
        &self,
        query: SubscribeCycleQuery,
    ) -> Result<CycleSubscription, SubscribeCycleError> {
        // Subscribe first; a change committed during the read shows up in
        // the stream instead of vanishing.
        let updates = self.cycle_store.subscribe(query.cycle_id);

        let snapshot = self
            .cycle_store
            .get(query.cycle_id)
            .await?
            .ok_or(SubscribeCycleError::CycleNotFound(query.cycle_id))?;

        Ok(CycleSubscription { snapshot, updates })
    }
}
