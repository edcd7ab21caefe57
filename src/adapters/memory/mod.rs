//! In-memory adapters for tests and single-process development.

mod cycle_store;
mod group_directory;
mod suspension_store;

pub use cycle_store::InMemoryCycleStore;
pub use group_directory::InMemoryGroupDirectory;
pub use suspension_store::InMemorySuspensionStore;
