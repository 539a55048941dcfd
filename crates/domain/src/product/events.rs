//! Events recorded by the product aggregate and accepted by the message bus.

use chrono::NaiveDate;
use common::{BatchRef, OrderId, Sku};
use serde::{Deserialize, Serialize};

use super::OrderLine;

/// Messages that signal a state change needing propagation.
///
/// Events exist only as a product's outbox until the unit of work harvests
/// them; they are never persisted on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A new batch of stock was purchased.
    BatchCreated(BatchCreated),

    /// An order line needs to be allocated.
    AllocationRequired(AllocationRequired),

    /// The purchased quantity of a batch changed.
    BatchQuantityChanged(BatchQuantityChanged),

    /// No batch could take an order line.
    OutOfStock(OutOfStock),
}

/// Data for BatchCreated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    #[serde(rename = "ref")]
    pub reference: BatchRef,
    pub sku: Sku,
    pub qty: u32,
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

/// Data for AllocationRequired event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequired {
    pub orderid: OrderId,
    pub sku: Sku,
    pub qty: u32,
}

/// Data for BatchQuantityChanged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuantityChanged {
    #[serde(rename = "ref")]
    pub reference: BatchRef,
    pub qty: u32,
}

/// Data for OutOfStock event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfStock {
    pub sku: Sku,
}

/// Discriminant of an [`Event`], used to key handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BatchCreated,
    AllocationRequired,
    BatchQuantityChanged,
    OutOfStock,
}

impl EventKind {
    /// Returns the event type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BatchCreated => "BatchCreated",
            EventKind::AllocationRequired => "AllocationRequired",
            EventKind::BatchQuantityChanged => "BatchQuantityChanged",
            EventKind::OutOfStock => "OutOfStock",
        }
    }

    /// Returns true for events that ask for work to be done, as opposed to
    /// pure notifications.
    ///
    /// The bus requires at least one handler for command-shaped events.
    pub fn is_command(&self) -> bool {
        !matches!(self, EventKind::OutOfStock)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BatchCreated(_) => EventKind::BatchCreated,
            Event::AllocationRequired(_) => EventKind::AllocationRequired,
            Event::BatchQuantityChanged(_) => EventKind::BatchQuantityChanged,
            Event::OutOfStock(_) => EventKind::OutOfStock,
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

// Convenience constructors for events
impl Event {
    /// Creates a BatchCreated event.
    pub fn batch_created(
        reference: impl Into<BatchRef>,
        sku: impl Into<Sku>,
        qty: u32,
        eta: Option<NaiveDate>,
    ) -> Self {
        Event::BatchCreated(BatchCreated {
            reference: reference.into(),
            sku: sku.into(),
            qty,
            eta,
        })
    }

    /// Creates an AllocationRequired event.
    pub fn allocation_required(orderid: impl Into<OrderId>, sku: impl Into<Sku>, qty: u32) -> Self {
        Event::AllocationRequired(AllocationRequired {
            orderid: orderid.into(),
            sku: sku.into(),
            qty,
        })
    }

    /// Creates a BatchQuantityChanged event.
    pub fn batch_quantity_changed(reference: impl Into<BatchRef>, qty: u32) -> Self {
        Event::BatchQuantityChanged(BatchQuantityChanged {
            reference: reference.into(),
            qty,
        })
    }

    /// Creates an OutOfStock event.
    pub fn out_of_stock(sku: impl Into<Sku>) -> Self {
        Event::OutOfStock(OutOfStock { sku: sku.into() })
    }
}

impl From<&OrderLine> for AllocationRequired {
    fn from(line: &OrderLine) -> Self {
        Self {
            orderid: line.orderid().clone(),
            sku: line.sku().clone(),
            qty: line.qty(),
        }
    }
}
