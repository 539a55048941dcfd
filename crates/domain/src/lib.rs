//! Domain layer for the stock allocation system.
//!
//! This crate provides:
//! - `OrderLine` values and the `Batch` entities they are allocated against
//! - the `Product` aggregate, the only entry point for batch mutation
//! - the `Event` messages a product records for downstream handlers

pub mod product;

pub use common::{BatchRef, OrderId, Sku, Version};
pub use product::{
    AllocationError, AllocationRequired, Batch, BatchCreated, BatchQuantityChanged, Event,
    EventKind, OrderLine, OutOfStock, Product,
};
