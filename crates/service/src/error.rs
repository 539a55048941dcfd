use common::Sku;
use domain::{AllocationError, EventKind};
use store::StoreError;
use thiserror::Error;

/// Errors raised while handling a request or an event.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The SKU is unknown to the catalog.
    #[error("Invalid sku {0}")]
    InvalidSku(Sku),

    /// A command-shaped event reached the bus with no handler registered.
    #[error("No handler registered for {0}")]
    UnhandledCommand(EventKind),

    /// A handler was dispatched an event it does not accept.
    #[error("Handler {handler} cannot handle {event_type}")]
    UnexpectedEvent {
        handler: &'static str,
        event_type: &'static str,
    },

    /// A notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    #[error(transparent)]
    Domain(#[from] AllocationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Returns true if retrying the request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_retryable())
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
