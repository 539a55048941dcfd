//! Application layer of the allocation engine.
//!
//! Services open one unit-of-work scope each and perform a single coherent
//! mutation of a product. Handlers adapt events to services, and the
//! [`MessageBus`] dispatches an event together with every event it causes,
//! breadth first, until the queue is empty.

pub mod bus;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod services;

pub use bus::MessageBus;
pub use error::{Result, ServiceError};
pub use handlers::{
    AddBatch, Allocate, ChangeBatchQuantity, Handler, Outcome, SendOutOfStockNotification,
};
pub use notifications::{
    InMemoryNotificationSender, LogNotificationSender, NotificationSender, SentNotification,
};
