//! Refund endpoints: user-facing requests and the admin approval queue.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{OrderLineId, PaymentId, RefundId};
use domain::{Refund, RefundStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

use super::current_user;

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub payment_id: Uuid,
    pub reason: String,
    pub lines: Vec<RefundLineRequestBody>,
}

#[derive(Debug, Deserialize)]
pub struct RefundLineRequestBody {
    pub order_line_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdminCommentRequest {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct RefundLineResponse {
    pub order_line_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub reason: String,
    pub admin_comment: Option<String>,
    pub lines: Vec<RefundLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Refund> for RefundResponse {
    fn from(refund: Refund) -> Self {
        Self {
            id: refund.id().as_uuid(),
            payment_id: refund.payment_id().as_uuid(),
            order_id: refund.order_id().as_uuid(),
            status: refund.status().to_string(),
            amount_cents: refund.amount().cents(),
            reason: refund.reason().to_string(),
            admin_comment: refund.admin_comment().map(str::to_string),
            lines: refund
                .lines()
                .iter()
                .map(|line| RefundLineResponse {
                    order_line_id: line.order_line_id.as_uuid(),
                    product_id: line.product_id.to_string(),
                    product_name: line.product_name.clone(),
                    unit_price_cents: line.unit_price.cents(),
                    quantity: line.quantity,
                })
                .collect(),
            created_at: refund.created_at(),
            updated_at: refund.updated_at(),
        }
    }
}

/// `POST /refunds`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), ApiError> {
    let user_id = current_user(&headers)?;
    let lines = body
        .lines
        .into_iter()
        .map(|line| services::RefundLineRequest {
            order_line_id: OrderLineId::from_uuid(line.order_line_id),
            quantity: line.quantity,
        })
        .collect();

    let refund = state
        .services
        .refunds
        .process(
            user_id,
            PaymentId::from_uuid(body.payment_id),
            lines,
            body.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(refund.into())))
}

/// `GET /refunds`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<RefundResponse>>, ApiError> {
    let user_id = current_user(&headers)?;
    let refunds = state.services.refunds.list_by_user(user_id).await?;
    Ok(Json(refunds.into_iter().map(Into::into).collect()))
}

/// `GET /refunds/{id}`
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, ApiError> {
    let user_id = current_user(&headers)?;
    let refund = state
        .services
        .refunds
        .get_by_id_for_user(RefundId::from_uuid(id), user_id)
        .await?;
    Ok(Json(refund.into()))
}

/// `GET /admin/refunds?status=REQUESTED`
pub async fn list_by_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<RefundResponse>>, ApiError> {
    let status: RefundStatus = query
        .status
        .parse()
        .map_err(|e: String| ApiError::BadRequest(e))?;
    let refunds = state.services.refunds.list_by_status(status).await?;
    Ok(Json(refunds.into_iter().map(Into::into).collect()))
}

/// `POST /admin/refunds/{id}/approve`
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AdminCommentRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let refund = state
        .services
        .refunds
        .approve(RefundId::from_uuid(id), body.comment)
        .await?;
    Ok(Json(refund.into()))
}

/// `POST /admin/refunds/{id}/reject`
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AdminCommentRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let refund = state
        .services
        .refunds
        .reject(RefundId::from_uuid(id), body.comment)
        .await?;
    Ok(Json(refund.into()))
}
