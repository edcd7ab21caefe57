//! Order cycle domain - group-purchase lifecycle management.
//!
//! This module contains the OrderCycle aggregate root, the participant
//! ledger it owns, and the product-rollup derivation that decides which
//! products qualify when the collecting window closes.

mod aggregate;
mod aggregator;
mod participant;

pub use aggregate::{
    CollectingOutcome, OrderCycle, PaymentOutcome, CANCEL_REASON_NO_MINIMUM,
    CANCEL_REASON_NO_PAYMENTS,
};
pub use aggregator::{rebuild_aggregates, ProductAggregate, ProductContribution};
pub use participant::{OrderItem, Participant};
