//! Payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, PaymentId};
use domain::Payment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

use super::current_user;

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: Uuid,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id().as_uuid(),
            order_id: payment.order_id().as_uuid(),
            status: payment.status().to_string(),
            amount_cents: payment.amount().cents(),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
        }
    }
}

/// `POST /payments`
///
/// Returns `202 Accepted` with the `REQUESTED` record; settlement runs
/// asynchronously and the caller polls `GET /payments/{id}` for the
/// terminal status. Replays with the same idempotency key return the same
/// record.
pub async fn process(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ProcessPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let user_id = current_user(&headers)?;
    let payment = state
        .services
        .payments
        .process(
            user_id,
            OrderId::from_uuid(body.order_id),
            IdempotencyKey::new(body.idempotency_key),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(payment.into())))
}

/// `GET /payments`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let user_id = current_user(&headers)?;
    let payments = state.services.payments.list_by_user(user_id).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// `GET /payments/{id}`
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let user_id = current_user(&headers)?;
    let payment = state
        .services
        .payments
        .get_by_id_for_user(PaymentId::from_uuid(id), user_id)
        .await?;
    Ok(Json(payment.into()))
}
