//! End-to-end handling of allocation events through the message bus.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchRef, Sku};
use domain::{Event, EventKind, Product};
use service::{
    ChangeBatchQuantity, Handler, InMemoryNotificationSender, MessageBus, Outcome, Result,
    ServiceError,
};
use store::{InMemoryStore, InMemoryUnitOfWork, Store, UnitOfWork};

const STOCK_ADDRESS: &str = "stock@made.com";

fn test_bus() -> (MessageBus<InMemoryUnitOfWork>, InMemoryNotificationSender) {
    let sender = InMemoryNotificationSender::new();
    let bus = MessageBus::with_default_handlers(Arc::new(sender.clone()), STOCK_ADDRESS);
    (bus, sender)
}

fn tomorrow() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2030, 1, 2)
}

async fn product(store: &InMemoryStore, sku: &str) -> Product {
    store.product(&Sku::new(sku)).await.unwrap()
}

fn available(product: &Product, reference: &str) -> i64 {
    product
        .batch(&BatchRef::new(reference))
        .unwrap()
        .available_quantity()
}

/// Captures events instead of handling them.
#[derive(Clone, Default)]
struct Captured {
    events: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl Handler<InMemoryUnitOfWork> for Captured {
    fn name(&self) -> &'static str {
        "captured"
    }

    async fn handle(&self, event: &Event, _uow: &mut InMemoryUnitOfWork) -> Result<Outcome> {
        self.events.lock().unwrap().push(event.clone());
        Ok(Outcome::Notified)
    }
}

async fn replay(
    bus: &MessageBus<InMemoryUnitOfWork>,
    uow: &mut InMemoryUnitOfWork,
    events: Vec<Event>,
) {
    for event in events {
        bus.handle(event, uow).await.unwrap();
    }
}

fn indifferent_table_history() -> Vec<Event> {
    vec![
        Event::batch_created("batch1", "INDIFFERENT-TABLE", 50, None),
        Event::batch_created("batch2", "INDIFFERENT-TABLE", 50, tomorrow()),
        Event::allocation_required("order1", "INDIFFERENT-TABLE", 20),
        Event::allocation_required("order2", "INDIFFERENT-TABLE", 20),
    ]
}

#[tokio::test]
async fn add_batch_for_new_product() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();

    let outcomes = bus
        .handle(
            Event::batch_created("b1", "CRUNCHY-ARMCHAIR", 100, None),
            &mut uow,
        )
        .await
        .unwrap();

    assert_eq!(outcomes, vec![Outcome::BatchAdded(BatchRef::new("b1"))]);
    assert!(store.product(&Sku::new("CRUNCHY-ARMCHAIR")).await.is_some());
    assert_eq!(uow.commit_count(), 1);
}

#[tokio::test]
async fn allocate_returns_allocation() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![Event::batch_created("batch1", "COMPLICATED-LAMP", 100, None)],
    )
    .await;

    let outcomes = bus
        .handle(
            Event::allocation_required("o1", "COMPLICATED-LAMP", 10),
            &mut uow,
        )
        .await
        .unwrap();

    assert_eq!(outcomes[0].batchref(), Some(&BatchRef::new("batch1")));
}

#[tokio::test]
async fn allocate_for_invalid_sku_fails() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![Event::batch_created("b1", "AREALSKU", 100, None)],
    )
    .await;

    let result = bus
        .handle(
            Event::allocation_required("o1", "NONEXISTENTSKU", 10),
            &mut uow,
        )
        .await;

    assert!(matches!(result, Err(ServiceError::InvalidSku(_))));
}

#[tokio::test]
async fn change_batch_quantity_changes_available_quantity() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![Event::batch_created("batch1", "ADORABLE-SETTEE", 100, None)],
    )
    .await;
    assert_eq!(available(&product(&store, "ADORABLE-SETTEE").await, "batch1"), 100);

    bus.handle(Event::batch_quantity_changed("batch1", 50), &mut uow)
        .await
        .unwrap();

    assert_eq!(available(&product(&store, "ADORABLE-SETTEE").await, "batch1"), 50);
}

#[tokio::test]
async fn change_batch_quantity_reallocates_if_necessary() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(&bus, &mut uow, indifferent_table_history()).await;

    let table = product(&store, "INDIFFERENT-TABLE").await;
    assert_eq!(available(&table, "batch1"), 10);
    assert_eq!(available(&table, "batch2"), 50);

    let outcomes = bus
        .handle(Event::batch_quantity_changed("batch1", 25), &mut uow)
        .await
        .unwrap();

    // One line is bumped from batch1 and lands in batch2.
    assert_eq!(
        outcomes,
        vec![
            Outcome::QuantityChanged {
                reference: BatchRef::new("batch1"),
                reallocations: 1,
            },
            Outcome::Allocated(Some(BatchRef::new("batch2"))),
        ]
    );
    let table = product(&store, "INDIFFERENT-TABLE").await;
    assert_eq!(available(&table, "batch1"), 5);
    assert_eq!(available(&table, "batch2"), 30);
}

#[tokio::test]
async fn change_batch_quantity_publishes_reallocation() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(&bus, &mut uow, indifferent_table_history()).await;

    let captured = Captured::default();
    let mut isolated: MessageBus<InMemoryUnitOfWork> = MessageBus::new();
    isolated.register(
        EventKind::BatchQuantityChanged,
        Box::new(ChangeBatchQuantity),
    );
    isolated.register(EventKind::AllocationRequired, Box::new(captured.clone()));

    isolated
        .handle(Event::batch_quantity_changed("batch1", 25), &mut uow)
        .await
        .unwrap();

    let events = captured.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    let Event::AllocationRequired(reallocation) = &events[0] else {
        panic!("expected AllocationRequired, got {:?}", events[0]);
    };
    assert!(["order1", "order2"].contains(&reallocation.orderid.as_str()));
    assert_eq!(reallocation.sku, Sku::new("INDIFFERENT-TABLE"));
    assert_eq!(reallocation.qty, 20);
}

#[tokio::test]
async fn out_of_stock_sends_notification() {
    let (bus, sender) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![Event::batch_created("b1", "POPULAR-CURTAINS", 9, None)],
    )
    .await;

    let outcomes = bus
        .handle(
            Event::allocation_required("o1", "POPULAR-CURTAINS", 10),
            &mut uow,
        )
        .await
        .unwrap();

    assert_eq!(outcomes, vec![Outcome::Allocated(None), Outcome::Notified]);
    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, STOCK_ADDRESS);
    assert_eq!(sent[0].message, "Out of stock for POPULAR-CURTAINS");
}

#[tokio::test]
async fn caused_events_queue_behind_waiting_ones() {
    let (bus, sender) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![
            Event::batch_created("batch1", "SHELF", 100, None),
            Event::batch_created("batch2", "SHELF", 15, tomorrow()),
            Event::allocation_required("o1", "SHELF", 10),
            Event::allocation_required("o2", "SHELF", 30),
            Event::allocation_required("o3", "SHELF", 5),
        ],
    )
    .await;

    // Emptying batch1 bumps o1, o2 and o3 in that order. o2 does not fit in
    // batch2, and its OutOfStock is handled only after o3 is reallocated.
    let outcomes = bus
        .handle(Event::batch_quantity_changed("batch1", 0), &mut uow)
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            Outcome::QuantityChanged {
                reference: BatchRef::new("batch1"),
                reallocations: 3,
            },
            Outcome::Allocated(Some(BatchRef::new("batch2"))),
            Outcome::Allocated(None),
            Outcome::Allocated(Some(BatchRef::new("batch2"))),
            Outcome::Notified,
        ]
    );
    assert_eq!(sender.sent().len(), 1);
    assert_eq!(available(&product(&store, "SHELF").await, "batch2"), 0);
}

#[tokio::test]
async fn failing_handler_keeps_earlier_commits() {
    let (bus, sender) = test_bus();
    sender.set_fail_on_send(true);
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![
            Event::batch_created("batch1", "INDIFFERENT-TABLE", 50, None),
            Event::batch_created("batch2", "INDIFFERENT-TABLE", 25, tomorrow()),
            Event::allocation_required("order1", "INDIFFERENT-TABLE", 20),
            Event::allocation_required("order2", "INDIFFERENT-TABLE", 20),
        ],
    )
    .await;

    // Emptying batch1 bumps both lines. batch2 takes only one of them, so the
    // second reallocation runs out of stock and the notification fails.
    let result = bus
        .handle(Event::batch_quantity_changed("batch1", 0), &mut uow)
        .await;
    assert!(matches!(result, Err(ServiceError::Notification(_))));

    let table = product(&store, "INDIFFERENT-TABLE").await;
    assert_eq!(available(&table, "batch1"), 0);
    assert_eq!(available(&table, "batch2"), 5);
    assert!(uow.collect_new_events().is_empty());
}

#[tokio::test]
async fn deallocate_then_reallocate_round_trip() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![
            Event::batch_created("b1", "LAMP", 10, None),
            Event::allocation_required("o1", "LAMP", 10),
        ],
    )
    .await;

    let reference = service::services::deallocate(&mut uow, "o1".into(), "LAMP".into(), 10)
        .await
        .unwrap();
    assert_eq!(reference, BatchRef::new("b1"));
    assert_eq!(available(&product(&store, "LAMP").await, "b1"), 10);

    let outcomes = bus
        .handle(Event::allocation_required("o2", "LAMP", 10), &mut uow)
        .await
        .unwrap();
    assert_eq!(outcomes, vec![Outcome::Allocated(Some(BatchRef::new("b1")))]);
}

#[tokio::test]
async fn equal_arrival_batches_fill_in_insertion_order() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![
            Event::batch_created("second-by-name", "LAMP", 10, tomorrow()),
            Event::batch_created("first-by-name", "LAMP", 10, tomorrow()),
        ],
    )
    .await;

    let outcomes = bus
        .handle(Event::allocation_required("o1", "LAMP", 5), &mut uow)
        .await
        .unwrap();

    assert_eq!(
        outcomes[0].batchref(),
        Some(&BatchRef::new("second-by-name"))
    );
}

#[tokio::test]
async fn allocating_the_same_line_twice_is_idempotent() {
    let (bus, _) = test_bus();
    let store = InMemoryStore::new();
    let mut uow = store.unit_of_work();
    replay(
        &bus,
        &mut uow,
        vec![
            Event::batch_created("b1", "LAMP", 10, None),
            Event::allocation_required("o1", "LAMP", 4),
        ],
    )
    .await;

    let outcomes = bus
        .handle(Event::allocation_required("o1", "LAMP", 4), &mut uow)
        .await
        .unwrap();

    assert_eq!(outcomes[0].batchref(), Some(&BatchRef::new("b1")));
    let lamp = product(&store, "LAMP").await;
    assert_eq!(available(&lamp, "b1"), 6);
    assert_eq!(lamp.version().as_i64(), 1);
}
