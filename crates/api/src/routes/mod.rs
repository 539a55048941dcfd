//! HTTP route handlers.

pub mod allocations;
pub mod batches;
pub mod health;
pub mod metrics;
