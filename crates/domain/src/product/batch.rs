//! Batch entity.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use common::{BatchRef, Sku};

use super::{AllocationError, OrderLine};

/// A finite quantity of stock of one SKU, optionally arriving at a future date.
///
/// The available quantity is always derived from the purchased quantity and
/// the allocated lines; it is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    reference: BatchRef,
    sku: Sku,
    eta: Option<NaiveDate>,
    purchased_quantity: u32,
    allocations: BTreeSet<OrderLine>,
}

impl Batch {
    /// Creates a batch with no allocations.
    pub fn new(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        purchased_quantity: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Self {
            reference: reference.into(),
            sku: sku.into(),
            eta,
            purchased_quantity,
            allocations: BTreeSet::new(),
        }
    }

    /// Restores previously persisted allocations.
    ///
    /// Capacity is not re-checked: stored state is trusted as-is.
    pub fn with_allocations(mut self, lines: impl IntoIterator<Item = OrderLine>) -> Self {
        self.allocations.extend(lines);
        self
    }

    pub fn reference(&self) -> &BatchRef {
        &self.reference
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn eta(&self) -> Option<NaiveDate> {
        self.eta
    }

    pub fn purchased_quantity(&self) -> u32 {
        self.purchased_quantity
    }

    /// Returns the allocated order lines in a deterministic order.
    pub fn allocations(&self) -> impl Iterator<Item = &OrderLine> {
        self.allocations.iter()
    }

    /// Returns the total quantity of all allocated lines.
    pub fn allocated_quantity(&self) -> i64 {
        self.allocations
            .iter()
            .map(|line| i64::from(line.qty()))
            .sum()
    }

    /// Returns the purchased quantity minus the allocated quantity.
    ///
    /// Negative only between a quantity reduction and the deallocations that
    /// follow it.
    pub fn available_quantity(&self) -> i64 {
        i64::from(self.purchased_quantity) - self.allocated_quantity()
    }

    /// Returns true if the line is for this SKU and fits in the available quantity.
    pub fn can_allocate(&self, line: &OrderLine) -> bool {
        line.sku() == &self.sku && self.available_quantity() >= i64::from(line.qty())
    }

    /// Allocates the line if it fits; otherwise does nothing.
    ///
    /// Allocating a line that is already held is also a no-op.
    pub fn allocate(&mut self, line: OrderLine) {
        if self.can_allocate(&line) {
            self.allocations.insert(line);
        }
    }

    /// Removes the line if it is held; otherwise does nothing.
    pub fn deallocate(&mut self, line: &OrderLine) {
        self.allocations.remove(line);
    }

    /// Returns true if the line is allocated to this batch.
    pub fn contains(&self, line: &OrderLine) -> bool {
        self.allocations.contains(line)
    }

    /// Removes and returns one allocated line.
    pub fn deallocate_one(&mut self) -> Result<OrderLine, AllocationError> {
        self.allocations
            .pop_first()
            .ok_or_else(|| AllocationError::EmptyAllocations(self.reference.clone()))
    }

    /// Compares batches by arrival: batches in stock (no ETA) come first,
    /// then earlier ETAs.
    pub fn arrival_order(&self, other: &Batch) -> Ordering {
        match (self.eta, other.eta) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }

    pub(crate) fn set_purchased_quantity(&mut self, qty: u32) {
        self.purchased_quantity = qty;
    }
}
