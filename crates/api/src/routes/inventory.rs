//! Inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{InventoryRecord, ProductId};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct InitializeInventoryRequest {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddStockRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub product_id: String,
    pub available: u32,
    pub reserved: u32,
    pub total: u32,
}

impl From<InventoryRecord> for InventoryResponse {
    fn from(record: InventoryRecord) -> Self {
        Self {
            product_id: record.product_id().to_string(),
            available: record.available(),
            reserved: record.reserved(),
            total: record.total(),
        }
    }
}

/// `POST /inventory`
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InitializeInventoryRequest>,
) -> Result<(StatusCode, Json<InventoryResponse>), ApiError> {
    let record = state
        .services
        .inventory
        .initialize(ProductId::new(body.product_id))
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// `POST /inventory/{product_id}/stock`
pub async fn add_stock(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(body): Json<AddStockRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .services
        .inventory
        .add_stock(&ProductId::new(product_id), body.quantity)
        .await?;
    Ok(Json(record.into()))
}

/// `GET /inventory/{product_id}`
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let record = state
        .services
        .inventory
        .get_by_product(&ProductId::new(product_id))
        .await?;
    Ok(Json(record.into()))
}
