//! Event handlers registered on the message bus.

use std::sync::Arc;

use async_trait::async_trait;
use common::BatchRef;
use domain::Event;
use store::UnitOfWork;

use crate::notifications::NotificationSender;
use crate::{Result, ServiceError, services};

/// What a handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    BatchAdded(BatchRef),
    /// `None` when the line was out of stock.
    Allocated(Option<BatchRef>),
    QuantityChanged {
        reference: BatchRef,
        reallocations: usize,
    },
    Notified,
}

impl Outcome {
    /// Returns the batch an allocation went to, if this outcome is one.
    pub fn batchref(&self) -> Option<&BatchRef> {
        match self {
            Outcome::Allocated(reference) => reference.as_ref(),
            _ => None,
        }
    }
}

/// Reacts to one kind of event.
///
/// Handlers that touch products open their own scope on the shared unit of
/// work; events those products record are picked up by the bus afterwards.
#[async_trait]
pub trait Handler<U: UnitOfWork>: Send + Sync {
    /// Returns the name of this handler.
    fn name(&self) -> &'static str;

    /// Handles a single event.
    async fn handle(&self, event: &Event, uow: &mut U) -> Result<Outcome>;
}

fn unexpected(handler: &'static str, event: &Event) -> ServiceError {
    ServiceError::UnexpectedEvent {
        handler,
        event_type: event.event_type(),
    }
}

/// Handles `BatchCreated`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddBatch;

#[async_trait]
impl<U: UnitOfWork> Handler<U> for AddBatch {
    fn name(&self) -> &'static str {
        "add_batch"
    }

    async fn handle(&self, event: &Event, uow: &mut U) -> Result<Outcome> {
        let Event::BatchCreated(created) = event else {
            return Err(unexpected(Handler::<U>::name(self), event));
        };
        services::add_batch(
            uow,
            created.reference.clone(),
            created.sku.clone(),
            created.qty,
            created.eta,
        )
        .await?;
        Ok(Outcome::BatchAdded(created.reference.clone()))
    }
}

/// Handles `AllocationRequired`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Allocate;

#[async_trait]
impl<U: UnitOfWork> Handler<U> for Allocate {
    fn name(&self) -> &'static str {
        "allocate"
    }

    async fn handle(&self, event: &Event, uow: &mut U) -> Result<Outcome> {
        let Event::AllocationRequired(required) = event else {
            return Err(unexpected(Handler::<U>::name(self), event));
        };
        let batchref = services::allocate(
            uow,
            required.orderid.clone(),
            required.sku.clone(),
            required.qty,
        )
        .await?;
        Ok(Outcome::Allocated(batchref))
    }
}

/// Handles `BatchQuantityChanged`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeBatchQuantity;

#[async_trait]
impl<U: UnitOfWork> Handler<U> for ChangeBatchQuantity {
    fn name(&self) -> &'static str {
        "change_batch_quantity"
    }

    async fn handle(&self, event: &Event, uow: &mut U) -> Result<Outcome> {
        let Event::BatchQuantityChanged(changed) = event else {
            return Err(unexpected(Handler::<U>::name(self), event));
        };
        let reallocations =
            services::change_batch_quantity(uow, changed.reference.clone(), changed.qty).await?;
        Ok(Outcome::QuantityChanged {
            reference: changed.reference.clone(),
            reallocations,
        })
    }
}

/// Handles `OutOfStock` by notifying the stock team. Does not touch the unit
/// of work.
pub struct SendOutOfStockNotification {
    sender: Arc<dyn NotificationSender>,
    address: String,
}

impl SendOutOfStockNotification {
    pub fn new(sender: Arc<dyn NotificationSender>, address: impl Into<String>) -> Self {
        Self {
            sender,
            address: address.into(),
        }
    }
}

#[async_trait]
impl<U: UnitOfWork> Handler<U> for SendOutOfStockNotification {
    fn name(&self) -> &'static str {
        "send_out_of_stock_notification"
    }

    async fn handle(&self, event: &Event, _uow: &mut U) -> Result<Outcome> {
        let Event::OutOfStock(out_of_stock) = event else {
            return Err(unexpected(Handler::<U>::name(self), event));
        };
        self.sender
            .send(
                &self.address,
                &format!("Out of stock for {}", out_of_stock.sku),
            )
            .await?;
        Ok(Outcome::Notified)
    }
}
