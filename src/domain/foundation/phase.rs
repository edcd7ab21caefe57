//! CyclePhase state machine for the order cycle lifecycle.
//!
//! Phases advance monotonically along collecting -> payment_window ->
//! confirmed -> processing -> completed. Cancellation is a side exit
//! reachable only while the cycle is still open (collecting or
//! payment_window).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{StateMachine, ValidationError};

/// Lifecycle phase of an order cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Members are placing orders.
    #[default]
    Collecting,

    /// Order collection closed; participants must pay before the deadline.
    PaymentWindow,

    /// Enough payments arrived; the group order is locked in.
    Confirmed,

    /// The confirmed order is being fulfilled (administrative step).
    Processing,

    /// Goods delivered; the cycle is finished.
    Completed,

    /// The cycle died before confirmation (thresholds or payments failed).
    Cancelled,
}

impl CyclePhase {
    /// Returns true while the cycle still accepts lifecycle mutations
    /// (orders during collecting, payments during the payment window).
    pub fn is_open(&self) -> bool {
        matches!(self, CyclePhase::Collecting | CyclePhase::PaymentWindow)
    }

    /// Returns true once the cycle has reached a confirmed-or-later phase.
    pub fn is_confirmed_or_later(&self) -> bool {
        matches!(
            self,
            CyclePhase::Confirmed | CyclePhase::Processing | CyclePhase::Completed
        )
    }

    /// Returns the canonical snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Collecting => "collecting",
            CyclePhase::PaymentWindow => "payment_window",
            CyclePhase::Confirmed => "confirmed",
            CyclePhase::Processing => "processing",
            CyclePhase::Completed => "completed",
            CyclePhase::Cancelled => "cancelled",
        }
    }
}

impl StateMachine for CyclePhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use CyclePhase::*;
        matches!(
            (self, target),
            (Collecting, PaymentWindow)
                | (Collecting, Cancelled)
                | (PaymentWindow, Confirmed)
                | (PaymentWindow, Cancelled)
                | (Confirmed, Processing)
                | (Processing, Completed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use CyclePhase::*;
        match self {
            Collecting => vec![PaymentWindow, Cancelled],
            PaymentWindow => vec![Confirmed, Cancelled],
            Confirmed => vec![Processing],
            Processing => vec![Completed],
            Completed => vec![],
            Cancelled => vec![],
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CyclePhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collecting" => Ok(CyclePhase::Collecting),
            "payment_window" => Ok(CyclePhase::PaymentWindow),
            "confirmed" => Ok(CyclePhase::Confirmed),
            "processing" => Ok(CyclePhase::Processing),
            "completed" => Ok(CyclePhase::Completed),
            "cancelled" => Ok(CyclePhase::Cancelled),
            other => Err(ValidationError::invalid_format(
                "phase",
                format!("unknown phase '{}'", other),
            )),
        }
    }
}
