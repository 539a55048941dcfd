//! Breadth-first event dispatch.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use domain::{Event, EventKind};
use store::UnitOfWork;

use crate::handlers::{
    AddBatch, Allocate, ChangeBatchQuantity, Handler, Outcome, SendOutOfStockNotification,
};
use crate::notifications::NotificationSender;
use crate::{Result, ServiceError};

/// Dispatches events to their registered handlers.
///
/// `handle` processes a queue seeded with one event. Every handler for the
/// dequeued event runs in registration order; after each one the events its
/// products recorded are appended to the back of the queue. Handling ends
/// when the queue is empty.
///
/// A command-shaped event with no handlers fails with `UnhandledCommand`;
/// a notification with no handlers is skipped. A failing handler aborts the
/// call, and events handled before it stay committed. Handlers must not
/// produce an unbounded chain of events.
pub struct MessageBus<U: UnitOfWork + 'static> {
    handlers: HashMap<EventKind, Vec<Box<dyn Handler<U>>>>,
}

impl<U: UnitOfWork + 'static> Default for MessageBus<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: UnitOfWork + 'static> MessageBus<U> {
    /// Creates a bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a bus with the allocation handlers registered.
    pub fn with_default_handlers(
        sender: Arc<dyn NotificationSender>,
        out_of_stock_address: impl Into<String>,
    ) -> Self {
        let mut bus = Self::new();
        bus.register(EventKind::BatchCreated, Box::new(AddBatch));
        bus.register(EventKind::AllocationRequired, Box::new(Allocate));
        bus.register(EventKind::BatchQuantityChanged, Box::new(ChangeBatchQuantity));
        bus.register(
            EventKind::OutOfStock,
            Box::new(SendOutOfStockNotification::new(sender, out_of_stock_address)),
        );
        bus
    }

    /// Appends a handler for an event kind.
    pub fn register(&mut self, kind: EventKind, handler: Box<dyn Handler<U>>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Returns the number of handlers registered for an event kind.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Handles an event and every event it causes, returning the outcome of
    /// each handler invocation in order.
    #[tracing::instrument(skip(self, event, uow), fields(event_type = event.event_type()))]
    pub async fn handle(&self, event: Event, uow: &mut U) -> Result<Vec<Outcome>> {
        let started = Instant::now();
        let mut queue = VecDeque::from([event]);
        let mut outcomes = Vec::new();

        while let Some(event) = queue.pop_front() {
            let kind = event.kind();
            let handlers = self.handlers.get(&kind).map(Vec::as_slice).unwrap_or_default();

            if handlers.is_empty() {
                if kind.is_command() {
                    return Err(ServiceError::UnhandledCommand(kind));
                }
                tracing::debug!(event_type = kind.as_str(), "no handlers for notification");
                continue;
            }

            for handler in handlers {
                tracing::debug!(handler = handler.name(), event_type = kind.as_str(), "dispatching");
                let outcome = handler.handle(&event, uow).await.inspect_err(|e| {
                    tracing::warn!(handler = handler.name(), error = %e, "handler failed");
                })?;
                outcomes.push(outcome);
                queue.extend(uow.collect_new_events());
            }

            metrics::counter!("bus_events_handled_total", "event_type" => kind.as_str())
                .increment(1);
        }

        metrics::histogram!("bus_handle_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use store::{InMemoryStore, InMemoryUnitOfWork, Store};

    use super::*;
    use crate::InMemoryNotificationSender;

    /// Records the order in which it sees events.
    struct Recording {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Handler<InMemoryUnitOfWork> for Recording {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, event: &Event, _uow: &mut InMemoryUnitOfWork) -> Result<Outcome> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.event_type()));
            Ok(Outcome::Notified)
        }
    }

    #[test]
    fn default_handlers_cover_every_event_kind() {
        let bus: MessageBus<InMemoryUnitOfWork> =
            MessageBus::with_default_handlers(Arc::new(InMemoryNotificationSender::new()), "x@y");

        for kind in [
            EventKind::BatchCreated,
            EventKind::AllocationRequired,
            EventKind::BatchQuantityChanged,
            EventKind::OutOfStock,
        ] {
            assert_eq!(bus.handler_count(kind), 1);
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus: MessageBus<InMemoryUnitOfWork> = MessageBus::new();
        for label in ["first", "second"] {
            bus.register(
                EventKind::OutOfStock,
                Box::new(Recording {
                    label,
                    seen: seen.clone(),
                }),
            );
        }
        let mut uow = InMemoryStore::new().unit_of_work();

        let outcomes = bus
            .handle(Event::out_of_stock("LAMP"), &mut uow)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:OutOfStock", "second:OutOfStock"]
        );
    }

    #[tokio::test]
    async fn notification_without_handlers_is_skipped() {
        let bus: MessageBus<InMemoryUnitOfWork> = MessageBus::new();
        let mut uow = InMemoryStore::new().unit_of_work();

        let outcomes = bus
            .handle(Event::out_of_stock("LAMP"), &mut uow)
            .await
            .unwrap();

        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn command_without_handlers_fails() {
        let bus: MessageBus<InMemoryUnitOfWork> = MessageBus::new();
        let mut uow = InMemoryStore::new().unit_of_work();

        let result = bus
            .handle(Event::allocation_required("o1", "LAMP", 1), &mut uow)
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::UnhandledCommand(EventKind::AllocationRequired))
        ));
    }
}
