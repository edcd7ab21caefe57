//! PostgreSQL adapters - Database implementations for the store ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresCycleStore` - OrderCycle rows with JSONB ledger columns
//! - `PostgresSuspensionStore` - Suspension records plus audit trail
//! - `PostgresGroupDirectory` - Externally-owned group tables

mod cycle_store;
mod group_directory;
mod suspension_store;

pub use cycle_store::PostgresCycleStore;
pub use group_directory::PostgresGroupDirectory;
pub use suspension_store::PostgresSuspensionStore;
