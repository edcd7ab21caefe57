//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod deadline_worker;
pub mod handlers;

pub use deadline_worker::{DeadlineWorker, DeadlineWorkerConfig};
pub use handlers::{
    // Cycle handlers
    AdvanceFulfillmentCommand, AdvanceFulfillmentHandler, AdvanceFulfillmentResult,
    CloseCollectingCommand, CloseCollectingHandler, CloseCollectingResult,
    ClosePaymentWindowCommand, ClosePaymentWindowHandler, ClosePaymentWindowResult,
    PlaceOrderCommand, PlaceOrderHandler, PlaceOrderResult,
    RecordPaymentCommand, RecordPaymentHandler, RecordPaymentResult,
    StartCycleCommand, StartCycleHandler, StartCycleResult,
    SubscribeCycleHandler, SubscribeCycleQuery,
    // Suspension handlers
    CheckSuspensionHandler, CheckSuspensionQuery, SuspensionStatus,
};
