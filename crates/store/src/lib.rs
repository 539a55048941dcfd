//! Persistence for the stock allocation system.
//!
//! This crate provides:
//! - the `Repository` and `UnitOfWork` capability traits and the `Store` factory
//! - an in-memory backend for tests and local runs
//! - a PostgreSQL backend built on `sqlx`, with its migrations
//!
//! Both backends reject a commit whose products changed in storage after they
//! were loaded.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod unit_of_work;

pub use error::{Result, StoreError};
pub use memory::{InMemoryRepository, InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresRepository, PostgresStore, PostgresUnitOfWork};
pub use repository::{Repository, TrackedProducts};
pub use unit_of_work::{ScopeState, Store, UnitOfWork};
