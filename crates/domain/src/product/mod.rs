//! Product aggregate and related types.

mod aggregate;
mod batch;
mod events;
mod order_line;

pub use aggregate::Product;
pub use batch::Batch;
pub use events::{
    AllocationRequired, BatchCreated, BatchQuantityChanged, Event, EventKind, OutOfStock,
};
pub use order_line::OrderLine;

use common::{BatchRef, OrderId, Sku};
use thiserror::Error;

/// Errors raised by the allocation domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Order lines must request at least one unit.
    #[error("Invalid quantity: {qty} (must be greater than 0)")]
    InvalidQuantity { qty: u32 },

    /// A batch was offered to a product with a different SKU.
    #[error("Batch {reference} is for sku {batch_sku}, not {product_sku}")]
    SkuMismatch {
        reference: BatchRef,
        batch_sku: Sku,
        product_sku: Sku,
    },

    /// A batch with this reference already exists.
    #[error("Batch already exists: {0}")]
    DuplicateBatch(BatchRef),

    /// No batch of the product holds the order line being deallocated.
    #[error("No batch containing order line {orderid} for sku {sku}")]
    NoBatchContainingOrderLine { orderid: OrderId, sku: Sku },

    /// A batch was asked to give up a line but holds none.
    #[error("Batch {0} has no allocations")]
    EmptyAllocations(BatchRef),

    /// The product has no batch with this reference.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchRef),
}
