use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::require_idempotency_key;
use crate::services::coordinator::{AdjustmentRequest, ReceiptRequest};
use crate::services::inventory::ReserveRequest;
use crate::{ApiResponse, AppState};

pub fn inventory_router() -> Router<AppState> {
    Router::new()
        .route("/inventory/reserve", post(reserve))
        .route("/inventory/release", post(release))
        .route("/inventory/adjust", post(adjust))
        .route("/inventory/receive", post(receive))
        .route("/inventory/:item_id/:location_id", get(snapshot))
        .route("/inventory/:item_id/:location_id/rebuild", post(rebuild))
}

/// On-hand / reserved / available for one (item, location).
async fn snapshot(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state.inventory.snapshot(item_id, location_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(snapshot))))
}

/// Place a cart hold.
async fn reserve(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let reservation = state.inventory.reserve(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(reservation))))
}

#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    reservation_id: Uuid,
}

/// Release a hold without a ledger movement.
async fn release(
    State(state): State<AppState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let reservation = state.inventory.release(req.reservation_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(reservation))))
}

/// Administrative stock correction (one audit movement).
async fn adjust(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let movement = state.coordinator.adjust(req, &key).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(movement))))
}

/// Purchase receipt.
async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReceiptRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let movement = state.coordinator.receive(req, &key).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(movement))))
}

/// Drift repair: rebuild the projection row from the ledger.
async fn rebuild(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state.inventory.rebuild_level(item_id, location_id).await?;
    let _ = state
        .event_sender
        .send(crate::events::Event::InventoryRebuilt {
            item_id,
            location_id,
            on_hand: snapshot.on_hand,
        })
        .await;
    Ok((StatusCode::OK, Json(ApiResponse::success(snapshot))))
}
