//! CloseCollectingHandler - Command handler for ending order collection.
//!
//! Invoked by the deadline worker when a collecting window lapses, and
//! available directly for administrative early closure. Closing is
//! idempotent: a cycle that already left the collecting phase is returned
//! unchanged.

use std::sync::Arc;

use tracing::warn;

use crate::config::CycleConfig;
use crate::domain::cycle::{CollectingOutcome, OrderCycle};
use crate::domain::foundation::{CycleId, CyclePhase, DomainError, ErrorCode, Timestamp};
use crate::ports::{CycleStore, GroupDirectory, TxOutcome};

/// Command to close a cycle's collecting window.
#[derive(Debug, Clone)]
pub struct CloseCollectingCommand {
    /// Cycle to close.
    pub cycle_id: CycleId,
}

/// Result of a collecting close.
#[derive(Debug, Clone)]
pub struct CloseCollectingResult {
    /// The cycle as committed.
    pub cycle: OrderCycle,
    /// What the close decided; `None` when the cycle had already moved on.
    pub outcome: Option<CollectingOutcome>,
}

/// Error type for collecting close.
#[derive(Debug)]
pub enum CloseCollectingError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for CloseCollectingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseCollectingError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            CloseCollectingError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CloseCollectingError {}

impl From<DomainError> for CloseCollectingError {
    fn from(err: DomainError) -> Self {
        CloseCollectingError::Domain(err)
    }
}

/// Handler for closing collecting windows.
pub struct CloseCollectingHandler {
    cycle_store: Arc<dyn CycleStore>,
    group_directory: Arc<dyn GroupDirectory>,
    config: CycleConfig,
}

impl CloseCollectingHandler {
    pub fn new(
        cycle_store: Arc<dyn CycleStore>,
        group_directory: Arc<dyn GroupDirectory>,
        config: CycleConfig,
    ) -> Self {
        Self {
            cycle_store,
            group_directory,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: CloseCollectingCommand,
    ) -> Result<CloseCollectingResult, CloseCollectingError> {
        let now = Timestamp::now();
        let payment_window_ends = now.add_hours(i64::from(self.config.payment_window_hours));

        // 1. Close under CAS. The closure may re-run, so the captured
        //    outcome is overwritten on every attempt.
        let mut outcome: Option<CollectingOutcome> = None;
        let committed = self
            .cycle_store
            .transact(cmd.cycle_id, &mut |cycle| {
                if cycle.phase() != CyclePhase::Collecting {
                    outcome = None;
                    return Ok(TxOutcome::Noop);
                }
                outcome = Some(cycle.close_collecting(now, payment_window_ends)?);
                Ok(TxOutcome::Commit)
            })
            .await
            .map_err(|err| match err.code {
                ErrorCode::CycleNotFound => CloseCollectingError::CycleNotFound(cmd.cycle_id),
                _ => CloseCollectingError::from(err),
            })?;

        // 2. A cancellation releases the group for its next cycle. The close
        //    itself is already committed, so a pointer failure only logs.
        if matches!(outcome, Some(CollectingOutcome::Cancelled)) {
            if let Err(err) = self
                .group_directory
                .set_current_cycle(committed.group_id(), None)
                .await
            {
                warn!(
                    cycle_id = %cmd.cycle_id,
                    error = %err,
                    "Failed to clear group cycle pointer after cancellation"
                );
            }
        }

        Ok(CloseCollectingResult {
            cycle: committed,
            outcome,
        })
    }
}
