//! Identifier and version types shared by every layer of the allocation system.

mod types;

pub use types::{BatchRef, OrderId, Sku, Version};
