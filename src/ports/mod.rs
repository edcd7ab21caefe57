//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `CycleStore` - OrderCycle persistence, CAS mutation, snapshot fan-out
//! - `SuspensionStore` - Suspension records and their audit trail
//! - `GroupDirectory` - Group membership and the per-group cycle pointer

mod cycle_store;
mod group_directory;
mod suspension_store;

pub use cycle_store::{CycleStore, Mutator, TxOutcome};
pub use group_directory::GroupDirectory;
pub use suspension_store::SuspensionStore;
