use common::{BatchRef, Sku, Version};
use thiserror::Error;

/// Errors that can occur when loading or persisting products.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product changed in storage after it was loaded.
    #[error(
        "Concurrency conflict for product {sku}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        sku: Sku,
        expected: Version,
        actual: Version,
    },

    /// A product added in this unit of work was created concurrently elsewhere.
    #[error("Product already exists: {0}")]
    ProductAlreadyExists(Sku),

    /// A batch reference is already used by another product.
    #[error("Batch reference already in use: {0}")]
    BatchReferenceTaken(BatchRef),

    /// The product is already tracked by this unit of work.
    #[error("Product already added in this unit of work: {0}")]
    DuplicateProduct(Sku),

    /// The unit of work was used outside an active scope.
    #[error("Unit of work is not active")]
    ScopeNotActive,

    /// `begin` was called on a scope that is still open.
    #[error("Unit of work is already active")]
    ScopeAlreadyActive,

    /// A stored row could not be turned back into domain state.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::ProductAlreadyExists(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
