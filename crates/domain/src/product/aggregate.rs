//! Product aggregate implementation.

use common::{BatchRef, Sku, Version};

use super::{AllocationError, Batch, Event, OrderLine};

/// Product aggregate root.
///
/// Owns every batch of one SKU. All batch mutation goes through the product,
/// which applies the allocation policy and records events for anything that
/// needs to happen elsewhere.
#[derive(Debug, Clone)]
pub struct Product {
    /// Catalog key shared by all batches.
    sku: Sku,

    /// Batches in insertion order; allocation sorts them by arrival.
    batches: Vec<Batch>,

    /// Current version for optimistic concurrency.
    version: Version,

    /// Pending events, oldest first.
    events: Vec<Event>,
}

impl Product {
    /// Creates a product with no batches.
    pub fn new(sku: impl Into<Sku>) -> Self {
        Self::restore(sku, Vec::new(), Version::initial())
    }

    /// Rebuilds a product from stored state.
    pub fn restore(sku: impl Into<Sku>, batches: Vec<Batch>, version: Version) -> Self {
        Self {
            sku: sku.into(),
            batches,
            version,
            events: Vec::new(),
        }
    }
}

// Query methods
impl Product {
    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Returns the batch with the given reference.
    pub fn batch(&self, reference: &BatchRef) -> Option<&Batch> {
        self.batches.iter().find(|b| b.reference() == reference)
    }

    /// Returns the reference of the batch holding the line, if any.
    pub fn batch_containing(&self, line: &OrderLine) -> Option<&BatchRef> {
        self.batches
            .iter()
            .find(|b| b.contains(line))
            .map(Batch::reference)
    }

    /// Returns the events recorded since the last harvest.
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

// Command methods
impl Product {
    /// Adds a batch of this product's SKU.
    pub fn add_batch(&mut self, batch: Batch) -> Result<(), AllocationError> {
        if batch.sku() != &self.sku {
            return Err(AllocationError::SkuMismatch {
                reference: batch.reference().clone(),
                batch_sku: batch.sku().clone(),
                product_sku: self.sku.clone(),
            });
        }

        if self.batch(batch.reference()).is_some() {
            return Err(AllocationError::DuplicateBatch(batch.reference().clone()));
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Allocates the line to the earliest-arriving batch that can take it.
    ///
    /// Batches with the same arrival keep their insertion order. A line that
    /// is already allocated returns its current batch unchanged. When no batch
    /// can take the line an `OutOfStock` event is recorded and `None` is
    /// returned.
    pub fn allocate(&mut self, line: OrderLine) -> Option<BatchRef> {
        if let Some(reference) = self.batch_containing(&line) {
            return Some(reference.clone());
        }

        let selected = self
            .batches
            .iter_mut()
            .filter(|batch| batch.can_allocate(&line))
            .min_by(|a, b| a.arrival_order(b));

        match selected {
            Some(batch) => {
                batch.allocate(line);
                self.version = self.version.next();
                Some(batch.reference().clone())
            }
            None => {
                tracing::debug!(sku = %line.sku(), orderid = %line.orderid(), "out of stock");
                self.events.push(Event::out_of_stock(line.sku().clone()));
                None
            }
        }
    }

    /// Removes the line from whichever batch holds it.
    pub fn deallocate(&mut self, line: &OrderLine) -> Result<BatchRef, AllocationError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.contains(line))
            .ok_or_else(|| AllocationError::NoBatchContainingOrderLine {
                orderid: line.orderid().clone(),
                sku: line.sku().clone(),
            })?;

        batch.deallocate(line);
        Ok(batch.reference().clone())
    }

    /// Sets a batch's purchased quantity, bumping allocations that no longer fit.
    ///
    /// Each bumped line is recorded as an `AllocationRequired` event so it can
    /// be re-allocated elsewhere. Returns the number of bumped lines.
    pub fn change_batch_quantity(
        &mut self,
        reference: &BatchRef,
        qty: u32,
    ) -> Result<usize, AllocationError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.reference() == reference)
            .ok_or_else(|| AllocationError::BatchNotFound(reference.clone()))?;

        batch.set_purchased_quantity(qty);

        let mut bumped = 0;
        while batch.available_quantity() < 0 {
            let line = batch.deallocate_one()?;
            self.events.push(Event::AllocationRequired((&line).into()));
            bumped += 1;
        }

        if bumped > 0 {
            tracing::debug!(batchref = %reference, bumped, "deallocated lines after quantity change");
        }

        Ok(bumped)
    }

    /// Drains and returns the pending events, oldest first.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
