//! Cycle command and query handlers.
//!
//! Handlers for cycle lifecycle operations and queries.

// Command handlers
mod advance_fulfillment;
mod close_collecting;
mod close_payment_window;
mod place_order;
mod record_payment;
mod start_cycle;

// Query handlers
mod subscribe_cycle;

pub use advance_fulfillment::{
    AdvanceFulfillmentCommand, AdvanceFulfillmentError, AdvanceFulfillmentHandler,
    AdvanceFulfillmentResult,
};
pub use close_collecting::{
    CloseCollectingCommand, CloseCollectingError, CloseCollectingHandler, CloseCollectingResult,
};
pub use close_payment_window::{
    ClosePaymentWindowCommand, ClosePaymentWindowError, ClosePaymentWindowHandler,
    ClosePaymentWindowResult,
};
pub use place_order::{
    OrderLine, PlaceOrderCommand, PlaceOrderError, PlaceOrderHandler, PlaceOrderResult,
};
pub use record_payment::{
    RecordPaymentCommand, RecordPaymentError, RecordPaymentHandler, RecordPaymentResult,
};
pub use start_cycle::{StartCycleCommand, StartCycleError, StartCycleHandler, StartCycleResult};

// Query handlers
pub use subscribe_cycle::{
    CycleSubscription, SubscribeCycleError, SubscribeCycleHandler, SubscribeCycleQuery,
};
