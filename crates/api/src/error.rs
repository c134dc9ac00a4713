//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use services::ServiceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (missing identity header, bad UUID, bad query).
    BadRequest(String),
    /// Business error from the service layer.
    Service(ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Service(err) => service_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::ProductNotFound(_)
        | ServiceError::InventoryNotFound(_)
        | ServiceError::OrderNotFound(_)
        | ServiceError::PaymentNotFound(_)
        | ServiceError::RefundNotFound(_)
        | ServiceError::OrderItemNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::DuplicatePayment { .. }
        | ServiceError::RefundNotAllowed(_)
        | ServiceError::RefundQuantityExceeded { .. } => StatusCode::CONFLICT,
        ServiceError::Domain(domain) => match domain {
            DomainError::InsufficientInventory { .. }
            | DomainError::InvalidInventoryState { .. }
            | DomainError::InvalidOrderStatus { .. }
            | DomainError::InvalidPaymentStatus { .. }
            | DomainError::InvalidRefundStatus { .. } => StatusCode::CONFLICT,
        },
        ServiceError::Store(_) | ServiceError::Integrity(_) => {
            tracing::error!(error = %err, "internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}
