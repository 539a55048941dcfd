//! Service entry points, one unit-of-work scope each.

use chrono::NaiveDate;
use common::{BatchRef, OrderId, Sku};
use domain::{AllocationError, Batch, OrderLine, Product};
use store::{Repository, UnitOfWork};

use crate::{Result, ServiceError};

/// Adds a batch, creating its product on first use.
#[tracing::instrument(skip(uow))]
pub async fn add_batch<U: UnitOfWork>(
    uow: &mut U,
    reference: BatchRef,
    sku: Sku,
    qty: u32,
    eta: Option<NaiveDate>,
) -> Result<()> {
    uow.begin().await?;
    let outcome = async {
        let products = uow.products()?;
        if products.get_by_batchref(&reference).await?.is_some() {
            return Err(AllocationError::DuplicateBatch(reference.clone()).into());
        }
        if products.get(&sku).await?.is_none() {
            products.add(Product::new(sku.clone())).await?;
        }
        let product = products
            .get(&sku)
            .await?
            .ok_or_else(|| ServiceError::InvalidSku(sku.clone()))?;
        product.add_batch(Batch::new(reference.clone(), sku.clone(), qty, eta))?;
        uow.commit().await?;
        tracing::info!(batchref = %reference, %sku, qty, "batch added");
        Ok::<_, ServiceError>(())
    }
    .await;
    uow.exit(outcome).await
}

/// Allocates an order line, returning the chosen batch or `None` when out of
/// stock.
#[tracing::instrument(skip(uow))]
pub async fn allocate<U: UnitOfWork>(
    uow: &mut U,
    orderid: OrderId,
    sku: Sku,
    qty: u32,
) -> Result<Option<BatchRef>> {
    let line = OrderLine::new(orderid, sku.clone(), qty)?;
    uow.begin().await?;
    let outcome = async {
        let product = uow
            .products()?
            .get(&sku)
            .await?
            .ok_or_else(|| ServiceError::InvalidSku(sku.clone()))?;
        let batchref = product.allocate(line);
        uow.commit().await?;
        Ok::<_, ServiceError>(batchref)
    }
    .await;
    let batchref = uow.exit(outcome).await?;

    match &batchref {
        Some(reference) => {
            metrics::counter!("allocations_total").increment(1);
            tracing::info!(batchref = %reference, %sku, "line allocated");
        }
        None => {
            metrics::counter!("out_of_stock_total").increment(1);
            tracing::info!(%sku, "out of stock");
        }
    }
    Ok(batchref)
}

/// Removes an order line from the batch holding it.
///
/// An unknown line or SKU fails with `NoBatchContainingOrderLine` and the
/// scope is rolled back.
#[tracing::instrument(skip(uow))]
pub async fn deallocate<U: UnitOfWork>(
    uow: &mut U,
    orderid: OrderId,
    sku: Sku,
    qty: u32,
) -> Result<BatchRef> {
    let line = OrderLine::new(orderid, sku.clone(), qty)?;
    uow.begin().await?;
    let outcome = async {
        let not_found = || AllocationError::NoBatchContainingOrderLine {
            orderid: line.orderid().clone(),
            sku: sku.clone(),
        };
        let Some(product) = uow.products()?.get(&sku).await? else {
            return Err(not_found().into());
        };
        let reference = product.deallocate(&line)?;
        uow.commit().await?;
        Ok::<_, ServiceError>(reference)
    }
    .await;
    let reference = uow.exit(outcome).await?;
    tracing::info!(batchref = %reference, %sku, "line deallocated");
    Ok(reference)
}

/// Changes a batch's purchased quantity, returning how many lines were bumped.
#[tracing::instrument(skip(uow))]
pub async fn change_batch_quantity<U: UnitOfWork>(
    uow: &mut U,
    reference: BatchRef,
    qty: u32,
) -> Result<usize> {
    uow.begin().await?;
    let outcome = async {
        let Some(product) = uow.products()?.get_by_batchref(&reference).await? else {
            return Err(AllocationError::BatchNotFound(reference.clone()).into());
        };
        let bumped = product.change_batch_quantity(&reference, qty)?;
        uow.commit().await?;
        Ok::<_, ServiceError>(bumped)
    }
    .await;
    let bumped = uow.exit(outcome).await?;
    tracing::info!(batchref = %reference, qty, bumped, "batch quantity changed");
    Ok(bumped)
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, ScopeState, Store};

    use super::*;

    #[tokio::test]
    async fn add_batch_for_new_product() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        add_batch(&mut uow, "b1".into(), "CRUNCHY-ARMCHAIR".into(), 100, None)
            .await
            .unwrap();

        assert!(store.product(&Sku::new("CRUNCHY-ARMCHAIR")).await.is_some());
        assert_eq!(uow.commit_count(), 1);
    }

    #[tokio::test]
    async fn add_batch_for_existing_product() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        add_batch(&mut uow, "b1".into(), "GARISH-RUG".into(), 100, None)
            .await
            .unwrap();
        add_batch(&mut uow, "b2".into(), "GARISH-RUG".into(), 99, None)
            .await
            .unwrap();

        let product = store.product(&Sku::new("GARISH-RUG")).await.unwrap();
        assert_eq!(product.batches().len(), 2);
    }

    #[tokio::test]
    async fn add_batch_rejects_a_taken_reference() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "LAMP".into(), 10, None)
            .await
            .unwrap();

        let result = add_batch(&mut uow, "b1".into(), "TABLE".into(), 10, None).await;

        assert!(matches!(
            result,
            Err(ServiceError::Domain(AllocationError::DuplicateBatch(_)))
        ));
        assert!(store.product(&Sku::new("TABLE")).await.is_none());
        assert_eq!(uow.state(), ScopeState::RolledBack);
    }

    #[tokio::test]
    async fn allocate_returns_allocation() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "batch1".into(), "COMPLICATED-LAMP".into(), 100, None)
            .await
            .unwrap();

        let result = allocate(&mut uow, "o1".into(), "COMPLICATED-LAMP".into(), 10)
            .await
            .unwrap();

        assert_eq!(result, Some(BatchRef::new("batch1")));
    }

    #[tokio::test]
    async fn allocate_errors_for_invalid_sku() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "AREALSKU".into(), 100, None)
            .await
            .unwrap();

        let result = allocate(&mut uow, "o1".into(), "NONEXISTENTSKU".into(), 10).await;

        assert!(matches!(result, Err(ServiceError::InvalidSku(sku)) if sku.as_str() == "NONEXISTENTSKU"));
        assert_eq!(uow.state(), ScopeState::RolledBack);
    }

    #[tokio::test]
    async fn allocate_rejects_zero_quantity_before_opening_a_scope() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        let result = allocate(&mut uow, "o1".into(), "LAMP".into(), 0).await;

        assert!(matches!(
            result,
            Err(ServiceError::Domain(AllocationError::InvalidQuantity { .. }))
        ));
        assert_eq!(uow.state(), ScopeState::NotStarted);
    }

    #[tokio::test]
    async fn out_of_stock_is_not_an_error() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "LAMP".into(), 5, None)
            .await
            .unwrap();

        let result = allocate(&mut uow, "o1".into(), "LAMP".into(), 10)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(uow.collect_new_events().len(), 1);
    }

    #[tokio::test]
    async fn deallocate_returns_the_batch_and_frees_stock() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "LAMP".into(), 10, None)
            .await
            .unwrap();
        allocate(&mut uow, "o1".into(), "LAMP".into(), 4)
            .await
            .unwrap();

        let reference = deallocate(&mut uow, "o1".into(), "LAMP".into(), 4)
            .await
            .unwrap();

        assert_eq!(reference, BatchRef::new("b1"));
        let product = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(product.batches()[0].available_quantity(), 10);
    }

    #[tokio::test]
    async fn deallocate_unknown_line_rolls_back() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "LAMP".into(), 10, None)
            .await
            .unwrap();

        let unknown_line = deallocate(&mut uow, "o1".into(), "LAMP".into(), 4).await;
        let unknown_sku = deallocate(&mut uow, "o1".into(), "NOPE".into(), 4).await;

        for result in [unknown_line, unknown_sku] {
            assert!(matches!(
                result,
                Err(ServiceError::Domain(
                    AllocationError::NoBatchContainingOrderLine { .. }
                ))
            ));
        }
        assert_eq!(uow.state(), ScopeState::RolledBack);
    }

    #[tokio::test]
    async fn change_batch_quantity_for_unknown_reference() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();

        let result = change_batch_quantity(&mut uow, "missing".into(), 5).await;

        assert!(matches!(
            result,
            Err(ServiceError::Domain(AllocationError::BatchNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn change_batch_quantity_bumps_lines() {
        let store = InMemoryStore::new();
        let mut uow = store.unit_of_work();
        add_batch(&mut uow, "b1".into(), "LAMP".into(), 20, None)
            .await
            .unwrap();
        for orderid in ["o1", "o2"] {
            allocate(&mut uow, orderid.into(), "LAMP".into(), 10)
                .await
                .unwrap();
        }

        let bumped = change_batch_quantity(&mut uow, "b1".into(), 15)
            .await
            .unwrap();

        assert_eq!(bumped, 1);
        let product = store.product(&Sku::new("LAMP")).await.unwrap();
        assert_eq!(product.batches()[0].available_quantity(), 5);
    }
}
