//! Suspension domain - payment-default restrictions.

mod record;

pub use record::{SuspensionAudit, SuspensionRecord};
