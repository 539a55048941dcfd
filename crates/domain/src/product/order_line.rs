//! Order line value object.

use common::{OrderId, Sku};

use super::AllocationError;

/// A request to allocate a quantity of one SKU to an order.
///
/// Order lines are compared by all three fields, so a batch holds at most one
/// copy of each `(orderid, sku, qty)` combination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderLine {
    orderid: OrderId,
    sku: Sku,
    qty: u32,
}

impl OrderLine {
    /// Creates a new order line.
    ///
    /// Fails with `InvalidQuantity` when `qty` is zero.
    pub fn new(
        orderid: impl Into<OrderId>,
        sku: impl Into<Sku>,
        qty: u32,
    ) -> Result<Self, AllocationError> {
        if qty == 0 {
            return Err(AllocationError::InvalidQuantity { qty });
        }

        Ok(Self {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        })
    }

    /// Returns the order this line belongs to.
    pub fn orderid(&self) -> &OrderId {
        &self.orderid
    }

    /// Returns the requested SKU.
    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    /// Returns the requested quantity.
    pub fn qty(&self) -> u32 {
        self.qty
    }
}
