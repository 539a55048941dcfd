use async_trait::async_trait;
use domain::Event;

use crate::{Repository, Result, StoreError};

/// Lifecycle of a unit-of-work scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeState {
    #[default]
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// Transaction boundary around one coherent set of product mutations.
///
/// A scope is opened with `begin`, mutated through `products`, and closed by
/// `commit` or `rollback`. `exit` closes a scope whichever way the work went:
/// anything not explicitly committed is rolled back.
///
/// ```ignore
/// uow.begin().await?;
/// let outcome: Result<_, ServiceError> = async {
///     let product = uow.products()?.get(&sku).await?;
///     // mutate the product
///     uow.commit().await?;
///     Ok(())
/// }
/// .await;
/// uow.exit(outcome).await
/// ```
#[async_trait]
pub trait UnitOfWork: Send {
    /// The repository bound to the scope.
    type Products: Repository;

    /// Returns the current state of the scope.
    fn state(&self) -> ScopeState;

    /// Opens a scope and binds a fresh repository.
    ///
    /// Fails with `ScopeAlreadyActive` if the previous scope was never closed.
    async fn begin(&mut self) -> Result<()>;

    /// Returns the repository of the active scope.
    fn products(&mut self) -> Result<&mut Self::Products>;

    /// Persists every tracked product and closes the scope.
    ///
    /// A failed commit leaves the scope rolled back.
    async fn commit(&mut self) -> Result<()>;

    /// Discards the changes of the active scope. A no-op outside an active scope.
    async fn rollback(&mut self) -> Result<()>;

    /// Drains the pending events of every product seen so far.
    fn collect_new_events(&mut self) -> Vec<Event>;

    /// Closes the scope after `outcome` was produced inside it.
    ///
    /// If the scope is still active it is rolled back. An error outcome is
    /// returned unchanged even if the rollback itself fails.
    async fn exit<T, E>(&mut self, outcome: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
    {
        if self.state() != ScopeState::Active {
            return outcome;
        }

        match self.rollback().await {
            Ok(()) => outcome,
            Err(rollback_err) => match outcome {
                Ok(_) => Err(rollback_err.into()),
                Err(original) => {
                    tracing::warn!(error = %rollback_err, "rollback failed while exiting scope");
                    Err(original)
                }
            },
        }
    }
}

/// Factory handing out a fresh unit of work per request.
pub trait Store: Clone + Send + Sync + 'static {
    type UnitOfWork: UnitOfWork + 'static;

    fn unit_of_work(&self) -> Self::UnitOfWork;
}
