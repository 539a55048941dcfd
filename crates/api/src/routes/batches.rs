//! Batch endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use domain::Event;
use serde::{Deserialize, Serialize};
use service::Outcome;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddBatchRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sku: String,
    pub qty: u32,
    #[serde(default)]
    pub eta: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ChangeQuantityRequest {
    pub qty: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct BatchAddedResponse {
    pub batchref: String,
}

#[derive(Serialize)]
pub struct QuantityChangedResponse {
    pub batchref: String,
    pub qty: u32,
    pub reallocated: usize,
}

// -- Handlers --

/// POST /batches — register a purchased batch.
#[tracing::instrument(skip(state, req), fields(batchref = %req.reference, sku = %req.sku))]
pub async fn add<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AddBatchRequest>,
) -> Result<(StatusCode, Json<BatchAddedResponse>), ApiError> {
    let mut uow = state.store.unit_of_work();
    let event = Event::batch_created(req.reference.as_str(), req.sku, req.qty, req.eta);
    state.bus.handle(event, &mut uow).await?;

    Ok((
        StatusCode::CREATED,
        Json(BatchAddedResponse {
            batchref: req.reference,
        }),
    ))
}

/// PATCH /batches/{reference} — change the purchased quantity of a batch,
/// reallocating lines that no longer fit.
#[tracing::instrument(skip(state, req))]
pub async fn change_quantity<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
    Json(req): Json<ChangeQuantityRequest>,
) -> Result<Json<QuantityChangedResponse>, ApiError> {
    let mut uow = state.store.unit_of_work();
    let event = Event::batch_quantity_changed(reference.as_str(), req.qty);
    let outcomes = state.bus.handle(event, &mut uow).await?;

    let reallocated = outcomes
        .iter()
        .find_map(|outcome| match outcome {
            Outcome::QuantityChanged { reallocations, .. } => Some(*reallocations),
            _ => None,
        })
        .unwrap_or_default();

    Ok(Json(QuantityChangedResponse {
        batchref: reference,
        qty: req.qty,
        reallocated,
    }))
}
