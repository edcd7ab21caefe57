//! AdvanceFulfillmentHandler - Command handler for post-confirmation steps.
//!
//! Confirmed cycles move to processing when the supplier order goes out,
//! and to completed when goods are handed over. Each call advances exactly
//! one step; completion releases the group for its next cycle.

use std::sync::Arc;

use tracing::warn;

use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{CycleId, CyclePhase, DomainError, ErrorCode, Timestamp};
use crate::ports::{CycleStore, GroupDirectory, TxOutcome};

/// Command to advance a cycle one fulfillment step.
#[derive(Debug, Clone)]
pub struct AdvanceFulfillmentCommand {
    /// Cycle to advance.
    pub cycle_id: CycleId,
}

/// Result of a fulfillment advance.
#[derive(Debug, Clone)]
pub struct AdvanceFulfillmentResult {
    /// The cycle as committed.
    pub cycle: OrderCycle,
    /// The phase the cycle advanced into.
    pub phase: CyclePhase,
}

/// Error type for fulfillment advancement.
#[derive(Debug)]
pub enum AdvanceFulfillmentError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// Domain error (including advancing from a non-fulfillment phase).
    Domain(DomainError),
}

impl std::fmt::Display for AdvanceFulfillmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvanceFulfillmentError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            AdvanceFulfillmentError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AdvanceFulfillmentError {}

impl From<DomainError> for AdvanceFulfillmentError {
    fn from(err: DomainError) -> Self {
        AdvanceFulfillmentError::Domain(err)
    }
}

/// Handler for advancing fulfillment.
pub struct AdvanceFulfillmentHandler {
    cycle_store: Arc<dyn CycleStore>,
    group_directory: Arc<dyn GroupDirectory>,
}

impl AdvanceFulfillmentHandler {
    pub fn new(cycle_store: Arc<dyn CycleStore>, group_directory: Arc<dyn GroupDirectory>) -> Self {
        Self {
            cycle_store,
            group_directory,
        }
    }

    pub async fn handle(
        &self,
        cmd: AdvanceFulfillmentCommand,
    ) -> Result<AdvanceFulfillmentResult, AdvanceFulfillmentError> {
        let now = Timestamp::now();

        let committed = self
            .cycle_store
            .transact(cmd.cycle_id, &mut |cycle| {
                cycle.advance_fulfillment(now)?;
                Ok(TxOutcome::Commit)
            })
            .await
            .map_err(|err| match err.code {
                ErrorCode::CycleNotFound => AdvanceFulfillmentError::CycleNotFound(cmd.cycle_id),
                _ => AdvanceFulfillmentError::from(err),
            })?;

        // Completion ends the group's engagement with this cycle.
        if committed.phase() == CyclePhase::Completed {
            if let Err(err) = self
                .group_directory
                .set_current_cycle(committed.group_id(), None)
                .await
            {
                warn!(
                    cycle_id = %cmd.cycle_id,
                    error = %err,
                    "Failed to clear group cycle pointer after completion"
                );
            }
        }

        let phase = committed.phase();
        Ok(AdvanceFulfillmentResult {
            cycle: committed,
            phase,
        })
    }
}
