//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Sku;
use domain::AllocationError;
use service::ServiceError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No batch could take the requested line.
    OutOfStock(Sku),
    /// Error raised by the allocation service.
    Service(ServiceError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::OutOfStock(sku) => (StatusCode::BAD_REQUEST, format!("Out of stock for {sku}")),
            ApiError::Service(err) => service_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    let status = match &err {
        ServiceError::InvalidSku(_) => StatusCode::BAD_REQUEST,
        ServiceError::Domain(domain_err) => match domain_err {
            AllocationError::InvalidQuantity { .. } | AllocationError::SkuMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            AllocationError::NoBatchContainingOrderLine { .. }
            | AllocationError::BatchNotFound(_) => StatusCode::NOT_FOUND,
            AllocationError::DuplicateBatch(_) => StatusCode::CONFLICT,
            AllocationError::EmptyAllocations(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ServiceError::Store(StoreError::BatchReferenceTaken(_)) => StatusCode::CONFLICT,
        _ if err.is_retryable() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, Version};

    use super::*;

    fn status_of(err: ServiceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn client_errors() {
        assert_eq!(
            status_of(ServiceError::InvalidSku(Sku::new("NOPE"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AllocationError::InvalidQuantity { qty: 0 }.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::OutOfStock(Sku::new("LAMP")).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_lines_and_batches_are_not_found() {
        assert_eq!(
            status_of(
                AllocationError::NoBatchContainingOrderLine {
                    orderid: OrderId::new("o1"),
                    sku: Sku::new("LAMP"),
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AllocationError::BatchNotFound("b1".into()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflicts() {
        assert_eq!(
            status_of(
                StoreError::ConcurrencyConflict {
                    sku: Sku::new("LAMP"),
                    expected: Version::new(1),
                    actual: Version::new(2),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AllocationError::DuplicateBatch("b1".into()).into()),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn everything_else_is_internal() {
        assert_eq!(
            status_of(StoreError::ScopeNotActive.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
