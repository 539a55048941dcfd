use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchRef, Sku, Version};
use domain::{Batch, Event, OrderLine, Product};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use crate::{
    Result, StoreError,
    repository::{Repository, TrackedProducts},
    unit_of_work::{ScopeState, Store, UnitOfWork},
};

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl Store for PostgresStore {
    type UnitOfWork = PostgresUnitOfWork;

    fn unit_of_work(&self) -> PostgresUnitOfWork {
        PostgresUnitOfWork::new(self.pool.clone())
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

/// Loads a product with its batches and allocations, locking its row for the
/// rest of the transaction.
async fn load_product(conn: &mut PgConnection, sku: &Sku) -> Result<Option<Product>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM products WHERE sku = $1 FOR UPDATE")
            .bind(sku.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    let Some(version) = version else {
        return Ok(None);
    };

    let line_rows = sqlx::query(
        r#"
        SELECT a.batch_id, ol.orderid, ol.qty
        FROM allocations a
        JOIN order_lines ol ON ol.id = a.orderline_id
        JOIN batches b ON b.id = a.batch_id
        WHERE b.sku = $1
        "#,
    )
    .bind(sku.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<i64, Vec<OrderLine>> = HashMap::new();
    for row in line_rows {
        let batch_id: i64 = row.try_get("batch_id")?;
        let orderid: String = row.try_get("orderid")?;
        let qty = to_u32(row.try_get("qty")?, "qty")?;
        let line = OrderLine::new(orderid, sku.clone(), qty)
            .map_err(|e| StoreError::InvalidRow(e.to_string()))?;
        lines.entry(batch_id).or_default().push(line);
    }

    // Insertion order is the tie-break between batches with the same ETA.
    let batch_rows = sqlx::query(
        r#"
        SELECT id, reference, purchased_quantity, eta
        FROM batches
        WHERE sku = $1
        ORDER BY id ASC
        "#,
    )
    .bind(sku.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut batches = Vec::with_capacity(batch_rows.len());
    for row in batch_rows {
        let id: i64 = row.try_get("id")?;
        let reference: String = row.try_get("reference")?;
        let purchased = to_u32(row.try_get("purchased_quantity")?, "purchased_quantity")?;
        let eta: Option<NaiveDate> = row.try_get("eta")?;
        let allocations = lines.remove(&id).unwrap_or_default();
        batches.push(Batch::new(reference, sku.clone(), purchased, eta).with_allocations(allocations));
    }

    Ok(Some(Product::restore(
        sku.clone(),
        batches,
        Version::new(version),
    )))
}

async fn save_product(
    conn: &mut PgConnection,
    product: &Product,
    loaded_version: Option<Version>,
) -> Result<()> {
    let sku = product.sku();
    match loaded_version {
        None => {
            let inserted =
                sqlx::query("INSERT INTO products (sku, version) VALUES ($1, $2) ON CONFLICT (sku) DO NOTHING")
                    .bind(sku.as_str())
                    .bind(product.version().as_i64())
                    .execute(&mut *conn)
                    .await?;
            if inserted.rows_affected() == 0 {
                return Err(StoreError::ProductAlreadyExists(sku.clone()));
            }
        }
        Some(expected) => {
            let updated =
                sqlx::query("UPDATE products SET version = $2 WHERE sku = $1 AND version = $3")
                    .bind(sku.as_str())
                    .bind(product.version().as_i64())
                    .bind(expected.as_i64())
                    .execute(&mut *conn)
                    .await?;
            if updated.rows_affected() == 0 {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM products WHERE sku = $1")
                        .bind(sku.as_str())
                        .fetch_optional(&mut *conn)
                        .await?;
                return Err(StoreError::ConcurrencyConflict {
                    sku: sku.clone(),
                    expected,
                    actual: Version::new(actual.unwrap_or_default()),
                });
            }
        }
    }

    for batch in product.batches() {
        let batch_id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO batches (reference, sku, purchased_quantity, eta)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (reference) DO UPDATE
                SET purchased_quantity = EXCLUDED.purchased_quantity, eta = EXCLUDED.eta
                WHERE batches.sku = EXCLUDED.sku
            RETURNING id
            "#,
        )
        .bind(batch.reference().as_str())
        .bind(sku.as_str())
        .bind(i64::from(batch.purchased_quantity()))
        .bind(batch.eta())
        .fetch_optional(&mut *conn)
        .await?;
        let Some(batch_id) = batch_id else {
            return Err(StoreError::BatchReferenceTaken(batch.reference().clone()));
        };

        // Allocations cascade with their order lines.
        sqlx::query(
            "DELETE FROM order_lines WHERE id IN (SELECT orderline_id FROM allocations WHERE batch_id = $1)",
        )
        .bind(batch_id)
        .execute(&mut *conn)
        .await?;

        for line in batch.allocations() {
            let line_id: i64 = sqlx::query_scalar(
                "INSERT INTO order_lines (orderid, sku, qty) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(line.orderid().as_str())
            .bind(line.sku().as_str())
            .bind(i64::from(line.qty()))
            .fetch_one(&mut *conn)
            .await?;

            sqlx::query("INSERT INTO allocations (orderline_id, batch_id) VALUES ($1, $2)")
                .bind(line_id)
                .bind(batch_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}

/// Repository reading and writing products inside one database transaction.
pub struct PostgresRepository {
    tx: Option<Transaction<'static, Postgres>>,
    tracked: TrackedProducts,
}

impl PostgresRepository {
    fn new() -> Self {
        Self {
            tx: None,
            tracked: TrackedProducts::new(),
        }
    }

    fn connection(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::ScopeNotActive),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn add(&mut self, product: Product) -> Result<&mut Product> {
        self.tracked.track_added(product)
    }

    async fn get(&mut self, sku: &Sku) -> Result<Option<&mut Product>> {
        if !self.tracked.contains(sku) {
            let loaded = load_product(self.connection()?, sku).await?;
            return match loaded {
                Some(product) => Ok(Some(self.tracked.track_loaded(product))),
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

        let sku: Option<String> = sqlx::query_scalar("SELECT sku FROM batches WHERE reference = $1")
            .bind(reference.as_str())
            .fetch_optional(self.connection()?)
            .await?;
        match sku {
            Some(sku) => {
                let sku = Sku::new(sku);
                self.get(&sku).await
            }
            None => Ok(None),
        }
    }

    fn tracked(&mut self) -> &mut TrackedProducts {
        &mut self.tracked
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Loaded product rows are locked with `SELECT ... FOR UPDATE`; the version
/// check at commit additionally rejects writes based on stale reads.
pub struct PostgresUnitOfWork {
    pool: PgPool,
    repository: PostgresRepository,
    state: ScopeState,
}

impl PostgresUnitOfWork {
    fn new(pool: PgPool) -> Self {
        Self {
            pool,
            repository: PostgresRepository::new(),
            state: ScopeState::NotStarted,
        }
    }

    fn fail_scope(&mut self) {
        self.repository.tx = None;
        self.repository.tracked.discard();
        self.state = ScopeState::RolledBack;
    }

    async fn flush(&mut self) -> Result<()> {
        let repository = &mut self.repository;
        let Some(tx) = repository.tx.as_mut() else {
            return Err(StoreError::ScopeNotActive);
        };
        for (product, loaded_version) in repository.tracked.iter() {
            save_product(&mut **tx, product, loaded_version).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    type Products = PostgresRepository;

    fn state(&self) -> ScopeState {
        self.state
    }

    async fn begin(&mut self) -> Result<()> {
        if self.state == ScopeState::Active {
            return Err(StoreError::ScopeAlreadyActive);
        }
        self.repository.tx = Some(self.pool.begin().await?);
        self.repository.tracked.reset();
        self.state = ScopeState::Active;
        Ok(())
    }

    fn products(&mut self) -> Result<&mut PostgresRepository> {
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

        if let Err(e) = self.flush().await {
            if matches!(e, StoreError::ConcurrencyConflict { .. }) {
                metrics::counter!("uow_conflicts_total").increment(1);
            }
            tracing::warn!(error = %e, "commit rejected");
            self.fail_scope();
            return Err(e);
        }

        let Some(tx) = self.repository.tx.take() else {
            return Err(StoreError::ScopeNotActive);
        };
        if let Err(e) = tx.commit().await {
            self.fail_scope();
            return Err(e.into());
        }

        self.repository.tracked.mark_persisted();
        self.state = ScopeState::Committed;
        metrics::counter!("uow_commits_total").increment(1);
        tracing::debug!(products = self.repository.tracked.len(), "unit of work committed");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn rollback(&mut self) -> Result<()> {
        if self.state != ScopeState::Active {
            return Ok(());
        }
        let tx = self.repository.tx.take();
        self.fail_scope();
        metrics::counter!("uow_rollbacks_total").increment(1);
        tracing::debug!("unit of work rolled back");
        if let Some(tx) = tx {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn collect_new_events(&mut self) -> Vec<Event> {
        self.repository.tracked.collect_events()
    }
}
