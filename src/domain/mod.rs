//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, enums, errors)
//! - `cycle` - Order cycle aggregate and group-purchase lifecycle
//! - `suspension` - Payment-default restrictions on users

pub mod cycle;
pub mod foundation;
pub mod suspension;
