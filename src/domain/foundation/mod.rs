//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, enums, and error types
//! that form the vocabulary of the order cycle domain.

mod errors;
mod ids;
mod payment_status;
mod phase;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CycleId, GroupId, ProductId, UserId};
pub use payment_status::PaymentStatus;
pub use phase::CyclePhase;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
