use async_trait::async_trait;
use common::{BatchRef, Sku, Version};
use domain::{Event, Product};

use crate::{Result, StoreError};

/// Capability interface for loading and storing product aggregates.
///
/// Every product returned by `get`/`get_by_batchref` or passed to `add` is
/// tracked for the rest of the unit of work: later lookups return the same
/// instance, commit persists it, and its events are harvested through
/// [`TrackedProducts::collect_events`].
#[async_trait]
pub trait Repository: Send {
    /// Starts tracking a new product and returns it for further mutation.
    ///
    /// Fails with `DuplicateProduct` if the SKU is already tracked. Whether the
    /// SKU already exists in storage is checked at commit.
    async fn add(&mut self, product: Product) -> Result<&mut Product>;

    /// Loads the product for a SKU.
    async fn get(&mut self, sku: &Sku) -> Result<Option<&mut Product>>;

    /// Loads the product owning the batch with the given reference.
    async fn get_by_batchref(&mut self, reference: &BatchRef) -> Result<Option<&mut Product>>;

    /// Returns the products seen in the current unit of work.
    fn tracked(&mut self) -> &mut TrackedProducts;
}

#[derive(Debug)]
struct Tracked {
    product: Product,
    /// Version read from storage; `None` for products added in this scope.
    loaded_version: Option<Version>,
}

/// Identity map of the products a unit of work has loaded or added.
///
/// Products are kept in visit order, so harvested events come out grouped by
/// product in the order the products were first touched.
#[derive(Debug, Default)]
pub struct TrackedProducts {
    entries: Vec<Tracked>,
    /// Events of earlier committed scopes that were not collected yet.
    carried: Vec<Event>,
}

impl TrackedProducts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, sku: &Sku) -> bool {
        self.entries.iter().any(|e| e.product.sku() == sku)
    }

    pub fn get_mut(&mut self, sku: &Sku) -> Option<&mut Product> {
        self.entries
            .iter_mut()
            .find(|e| e.product.sku() == sku)
            .map(|e| &mut e.product)
    }

    pub fn find_by_batch_mut(&mut self, reference: &BatchRef) -> Option<&mut Product> {
        self.entries
            .iter_mut()
            .find(|e| e.product.batch(reference).is_some())
            .map(|e| &mut e.product)
    }

    /// Tracks a product read from storage at its current version.
    pub fn track_loaded(&mut self, product: Product) -> &mut Product {
        let loaded_version = Some(product.version());
        self.push(Tracked {
            product,
            loaded_version,
        })
    }

    /// Tracks a product that does not exist in storage yet.
    pub fn track_added(&mut self, product: Product) -> Result<&mut Product> {
        if self.contains(product.sku()) {
            return Err(StoreError::DuplicateProduct(product.sku().clone()));
        }
        Ok(self.push(Tracked {
            product,
            loaded_version: None,
        }))
    }

    /// Iterates the tracked products with the version each had when loaded.
    pub fn iter(&self) -> impl Iterator<Item = (&Product, Option<Version>)> {
        self.entries.iter().map(|e| (&e.product, e.loaded_version))
    }

    /// Records that the tracked products now match storage.
    pub fn mark_persisted(&mut self) {
        for entry in &mut self.entries {
            entry.loaded_version = Some(entry.product.version());
        }
    }

    /// Forgets the tracked products, keeping their pending events for collection.
    pub fn reset(&mut self) {
        for mut entry in self.entries.drain(..) {
            self.carried.extend(entry.product.take_events());
        }
    }

    /// Forgets the tracked products together with their pending events.
    ///
    /// Events carried over from earlier committed scopes are kept.
    pub fn discard(&mut self) {
        self.entries.clear();
    }

    /// Drains every pending event: carried events first, then each tracked
    /// product's queue in visit order.
    pub fn collect_events(&mut self) -> Vec<Event> {
        let mut events = std::mem::take(&mut self.carried);
        for entry in &mut self.entries {
            events.extend(entry.product.take_events());
        }
        events
    }

    fn push(&mut self, tracked: Tracked) -> &mut Product {
        let index = self.entries.len();
        self.entries.push(tracked);
        &mut self.entries[index].product
    }
}
