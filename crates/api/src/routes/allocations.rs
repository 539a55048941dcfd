//! Allocation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::Sku;
use domain::Event;
use serde::{Deserialize, Serialize};
use service::{Outcome, services};
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AllocationRequest {
    pub orderid: String,
    pub sku: String,
    pub qty: u32,
}

#[derive(Serialize)]
pub struct AllocatedResponse {
    pub batchref: String,
}

/// POST /allocations — allocate an order line to a batch.
///
/// Responds 400 when the SKU is unknown or no batch can take the line.
#[tracing::instrument(skip(state, req), fields(orderid = %req.orderid, sku = %req.sku))]
pub async fn allocate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AllocationRequest>,
) -> Result<(StatusCode, Json<AllocatedResponse>), ApiError> {
    let mut uow = state.store.unit_of_work();
    let sku = Sku::new(req.sku);
    let event = Event::allocation_required(req.orderid, sku.clone(), req.qty);
    let outcomes = state.bus.handle(event, &mut uow).await?;

    let allocated = outcomes.iter().find_map(|outcome| match outcome {
        Outcome::Allocated(batchref) => Some(batchref.clone()),
        _ => None,
    });

    match allocated {
        Some(Some(batchref)) => Ok((
            StatusCode::CREATED,
            Json(AllocatedResponse {
                batchref: batchref.to_string(),
            }),
        )),
        Some(None) => Err(ApiError::OutOfStock(sku)),
        None => Err(ApiError::Internal(
            "allocation produced no outcome".to_string(),
        )),
    }
}

/// DELETE /allocations — release an order line from its batch.
#[tracing::instrument(skip(state, req), fields(orderid = %req.orderid, sku = %req.sku))]
pub async fn deallocate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AllocationRequest>,
) -> Result<StatusCode, ApiError> {
    let mut uow = state.store.unit_of_work();
    services::deallocate(&mut uow, req.orderid.into(), req.sku.into(), req.qty).await?;
    Ok(StatusCode::NO_CONTENT)
}
