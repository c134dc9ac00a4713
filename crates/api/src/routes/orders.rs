//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

use super::current_user;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequestBody>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequestBody {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: String,
    pub total_cents: i64,
    pub lines: Vec<OrderLineResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id().as_uuid(),
            status: order.status().to_string(),
            total_cents: order.total_amount().cents(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    id: line.id.as_uuid(),
                    product_id: line.product_id.to_string(),
                    product_name: line.product_name.clone(),
                    unit_price_cents: line.unit_price.cents(),
                    quantity: line.quantity,
                    subtotal_cents: line.subtotal().cents(),
                })
                .collect(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

/// `POST /orders`
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = current_user(&headers)?;
    let lines = body
        .lines
        .into_iter()
        .map(|line| services::OrderLineRequest {
            product_id: ProductId::new(line.product_id),
            quantity: line.quantity,
        })
        .collect();

    let order = state.services.orders.create(user_id, lines).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// `GET /orders`
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let user_id = current_user(&headers)?;
    let orders = state.services.orders.list_by_user(user_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// `GET /orders/{id}`
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let user_id = current_user(&headers)?;
    let order = state
        .services
        .orders
        .get_by_id_for_user(OrderId::from_uuid(id), user_id)
        .await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{id}/cancel`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let user_id = current_user(&headers)?;
    let order = state
        .services
        .orders
        .cancel(OrderId::from_uuid(id), user_id)
        .await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{id}/complete`
///
/// Fulfillment hook: consumes the reservations for good.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .services
        .orders
        .complete(OrderId::from_uuid(id))
        .await?;
    Ok(Json(order.into()))
}
