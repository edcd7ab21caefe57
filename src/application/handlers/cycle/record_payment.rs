//! RecordPaymentHandler - Command handler for payment-gateway callbacks.
//!
//! The gateway reports per-participant payment results while the payment
//! window is open. Results arriving in any other phase are rejected, so a
//! late callback cannot resurrect a closed cycle.

use std::sync::Arc;

use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{CycleId, DomainError, ErrorCode, PaymentStatus, Timestamp, UserId};
use crate::ports::{CycleStore, TxOutcome};

/// Command to record a payment result for one participant.
#[derive(Debug, Clone)]
pub struct RecordPaymentCommand {
    /// Cycle the payment belongs to.
    pub cycle_id: CycleId,
    /// Paying participant.
    pub user_id: UserId,
    /// Result reported by the payment gateway.
    pub status: PaymentStatus,
}

/// Result of successfully recording a payment.
#[derive(Debug, Clone)]
pub struct RecordPaymentResult {
    /// The cycle as committed.
    pub cycle: OrderCycle,
}

/// Error type for payment recording.
#[derive(Debug)]
pub enum RecordPaymentError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// The user has no order in this cycle.
    ParticipantNotFound(UserId),
    /// The cycle is not in its payment window.
    WindowClosed,
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for RecordPaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordPaymentError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            RecordPaymentError::ParticipantNotFound(user_id) => {
                write!(f, "User {} has no order in this cycle", user_id)
            }
            RecordPaymentError::WindowClosed => write!(f, "Cycle is not accepting payments"),
            RecordPaymentError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RecordPaymentError {}

impl From<DomainError> for RecordPaymentError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::WindowClosed => RecordPaymentError::WindowClosed,
            _ => RecordPaymentError::Domain(err),
        }
    }
}

/// Handler for recording payments.
pub struct RecordPaymentHandler {
    cycle_store: Arc<dyn CycleStore>,
}

impl RecordPaymentHandler {
    pub fn new(cycle_store: Arc<dyn CycleStore>) -> Self {
        Self { cycle_store }
    }

    pub async fn handle(
        &self,
        cmd: RecordPaymentCommand,
    ) -> Result<RecordPaymentResult, RecordPaymentError> {
        let now = Timestamp::now();

        let committed = self
            .cycle_store
            .transact(cmd.cycle_id, &mut |cycle| {
                cycle.record_payment(&cmd.user_id, cmd.status, now)?;
                Ok(TxOutcome::Commit)
            })
            .await
            .map_err(|err| match err.code {
                ErrorCode::CycleNotFound => RecordPaymentError::CycleNotFound(cmd.cycle_id),
                ErrorCode::ParticipantNotFound => {
                    RecordPaymentError::ParticipantNotFound(cmd.user_id.clone())
                }
                _ => RecordPaymentError::from(err),
            })?;

        Ok(RecordPaymentResult { cycle: committed })
    }
}
