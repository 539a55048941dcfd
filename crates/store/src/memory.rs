use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{BatchRef, Sku, Version};
use domain::{Event, Product};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    repository::{Repository, TrackedProducts},
    unit_of_work::{ScopeState, Store, UnitOfWork},
};

/// A committed product and the number of times it was written.
///
/// `revision` moves on every commit that touches the product, unlike the
/// product's own version which only moves on allocation.
#[derive(Clone)]
struct StoredProduct {
    product: Product,
    revision: Version,
}

type ProductMap = Arc<RwLock<HashMap<Sku, StoredProduct>>>;

/// In-memory product store for tests and local runs.
///
/// Units of work load clones of the stored products and write them back on
/// commit, so uncommitted changes never become visible to other scopes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    products: ProductMap,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the committed state of a product.
    pub async fn product(&self, sku: &Sku) -> Option<Product> {
        self.products
            .read()
            .await
            .get(sku)
            .map(|stored| stored.product.clone())
    }

    /// Returns the number of stored products.
    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }
}

impl Store for InMemoryStore {
    type UnitOfWork = InMemoryUnitOfWork;

    fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork::new(self.products.clone())
    }
}

/// Repository view over an [`InMemoryStore`] for one unit of work.
pub struct InMemoryRepository {
    products: ProductMap,
    tracked: TrackedProducts,
    /// Revision of each loaded product at the time it was read.
    revisions: HashMap<Sku, Version>,
}

impl InMemoryRepository {
    fn new(products: ProductMap) -> Self {
        Self {
            products,
            tracked: TrackedProducts::new(),
            revisions: HashMap::new(),
        }
    }

    fn track_stored(&mut self, stored: StoredProduct) -> &mut Product {
        self.revisions
            .insert(stored.product.sku().clone(), stored.revision);
        self.tracked.track_loaded(stored.product)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn add(&mut self, product: Product) -> Result<&mut Product> {
        self.tracked.track_added(product)
    }

    async fn get(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        if !self.tracked.contains(sku) {
            let stored = self.products.read().await.get(sku).cloned();
            return match stored {
                Some(stored) => Ok(Some(self.track_stored(stored))),
                None => Ok(None),
            };
        }
        Ok(self.tracked.get_mut(sku))
    }

    async fn get_by_batchref(&mut self, reference: &BatchRef) -> Result<Option<&mut Product>> {
        let tracked_sku = self
            .tracked
            .find_by_batch_mut(reference)
            .map(|product| product.sku().clone());
        if let Some(sku) = tracked_sku {
            return Ok(self.tracked.get_mut(&sku));
        }

        let stored = self
            .products
            .read()
            .await
            .values()
            .find(|stored| stored.product.batch(reference).is_some())
            .cloned();

        match stored {
            Some(stored) if self.tracked.contains(stored.product.sku()) => {
                Ok(self.tracked.get_mut(stored.product.sku()))
            }
            Some(stored) => Ok(Some(self.track_stored(stored))),
            None => Ok(None),
        }
    }

    fn tracked(&mut self) -> &mut TrackedProducts {
        &mut self.tracked
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Commit checks the revision of every loaded product against the stored one
/// and applies all of them or none. Any write committed after the load,
/// allocation or not, rejects the commit with `ConcurrencyConflict`.
pub struct InMemoryUnitOfWork {
    repository: InMemoryRepository,
    state: ScopeState,
    commits: usize,
}

impl InMemoryUnitOfWork {
    fn new(products: ProductMap) -> Self {
        Self {
            repository: InMemoryRepository::new(products),
            state: ScopeState::NotStarted,
            commits: 0,
        }
    }

    /// Returns how many scopes of this unit of work were committed.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    fn fail_scope(&mut self) {
        self.repository.tracked.discard();
        self.repository.revisions.clear();
        self.state = ScopeState::RolledBack;
    }
}

fn validate(stored: &HashMap<Sku, StoredProduct>, repository: &InMemoryRepository) -> Result<()> {
    for (product, loaded_version) in repository.tracked.iter() {
        let current = stored.get(product.sku());
        match (loaded_version, current) {
            (None, Some(_)) => {
                return Err(StoreError::ProductAlreadyExists(product.sku().clone()));
            }
            (Some(_), Some(current)) => {
                let expected = repository
                    .revisions
                    .get(product.sku())
                    .copied()
                    .unwrap_or_default();
                if current.revision != expected {
                    return Err(StoreError::ConcurrencyConflict {
                        sku: product.sku().clone(),
                        expected,
                        actual: current.revision,
                    });
                }
            }
            _ => {}
        }
    }

    // A batch reference belongs to one product only.
    let mut owners: HashMap<&BatchRef, &Sku> = stored
        .values()
        .flat_map(|s| {
            s.product
                .batches()
                .iter()
                .map(move |batch| (batch.reference(), s.product.sku()))
        })
        .collect();
    for (product, _) in repository.tracked.iter() {
        for batch in product.batches() {
            match owners.insert(batch.reference(), product.sku()) {
                Some(owner) if owner != product.sku() => {
                    return Err(StoreError::BatchReferenceTaken(batch.reference().clone()));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    type Products = InMemoryRepository;

    fn state(&self) -> ScopeState {
        self.state
    }

    async fn begin(&mut self) -> Result<()> {
        if self.state == ScopeState::Active {
            return Err(StoreError::ScopeAlreadyActive);
        }
        self.repository.tracked.reset();
        self.repository.revisions.clear();
        self.state = ScopeState::Active;
        Ok(())
    }

    fn products(&mut self) -> Result<&mut InMemoryRepository> {
        if self.state != ScopeState::Active {
            return Err(StoreError::ScopeNotActive);
        }
        Ok(&mut self.repository)
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&mut self) -> Result<()> {
        if self.state != ScopeState::Active {
            return Err(StoreError::ScopeNotActive);
        }

        let products = self.repository.products.clone();
        let mut stored = products.write().await;

        if let Err(e) = validate(&stored, &self.repository) {
            if matches!(e, StoreError::ConcurrencyConflict { .. }) {
                metrics::counter!("uow_conflicts_total").increment(1);
            }
            tracing::warn!(error = %e, "commit rejected");
            drop(stored);
            self.fail_scope();
            return Err(e);
        }

        for (product, _) in self.repository.tracked.iter() {
            let mut snapshot = product.clone();
            snapshot.take_events();
            let revision = stored
                .get(product.sku())
                .map_or(Version::initial(), |current| current.revision.next());
            self.repository
                .revisions
                .insert(product.sku().clone(), revision);
            stored.insert(
                snapshot.sku().clone(),
                StoredProduct {
                    product: snapshot,
                    revision,
                },
            );
        }
        drop(stored);

        self.repository.tracked.mark_persisted();
        self.state = ScopeState::Committed;
        self.commits += 1;
        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!(products = self.repository.tracked.len(), "unit of work committed");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rollback(&mut self) -> Result<()> {
        if self.state == ScopeState::Active {
            self.fail_scope();
            metrics::counter!("uow_rollbacks_total").increment(1);
            tracing::debug!("unit of work rolled back");
        }
        Ok(())
    }

    fn collect_new_events(&mut self) -> Vec<Event> {
        self.repository.tracked.collect_events()
    }
}
