//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod cycle;
pub mod suspension;

pub use cycle::{
    // Command handlers
    AdvanceFulfillmentCommand,
    AdvanceFulfillmentError,
    AdvanceFulfillmentHandler,
    AdvanceFulfillmentResult,
    CloseCollectingCommand,
    CloseCollectingError,
    CloseCollectingHandler,
    CloseCollectingResult,
    ClosePaymentWindowCommand,
    ClosePaymentWindowError,
    ClosePaymentWindowHandler,
    ClosePaymentWindowResult,
    OrderLine,
    PlaceOrderCommand,
    PlaceOrderError,
    PlaceOrderHandler,
    PlaceOrderResult,
    RecordPaymentCommand,
    RecordPaymentError,
    RecordPaymentHandler,
    RecordPaymentResult,
    StartCycleCommand,
    StartCycleError,
    StartCycleHandler,
    StartCycleResult,
    // Query handlers
    CycleSubscription,
    SubscribeCycleError,
    SubscribeCycleHandler,
    SubscribeCycleQuery,
};
pub use suspension::{
    CheckSuspensionError, CheckSuspensionHandler, CheckSuspensionQuery, SuspensionStatus,
};
