//! Suspension query handlers.
//!
//! Handlers for reading a user's payment-default suspension status.

// Query handlers
mod check_suspension;

pub use check_suspension::{
    CheckSuspensionError, CheckSuspensionHandler, CheckSuspensionQuery, SuspensionStatus,
};
