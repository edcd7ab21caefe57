//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-process stores for tests and development
//! - `postgres` - PostgreSQL-backed production stores

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCycleStore, InMemoryGroupDirectory, InMemorySuspensionStore};
pub use postgres::{PostgresCycleStore, PostgresGroupDirectory, PostgresSuspensionStore};
