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
use crate::services::transfers::TransferDraft;
use crate::{ApiResponse, AppState};

pub fn transfers_router() -> Router<AppState> {
    Router::new()
        .route("/transfers", post(request_transfer))
        .route("/transfers/in-transit", get(in_transit))
        .route("/transfers/:id", get(get_transfer))
        .route("/transfers/:id/ship", post(ship_transfer))
        .route("/transfers/:id/receive", post(receive_transfer))
        .route("/transfers/:id/cancel", post(cancel_transfer))
}

#[derive(Debug, Default, Deserialize)]
struct ActorBody {
    actor_id: Option<Uuid>,
}

async fn request_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(draft): Json<TransferDraft>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let transfer = state.coordinator.request_transfer(draft, &key).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(transfer))))
}

async fn ship_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<ActorBody>>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let actor_id = body.map(|Json(b)| b.actor_id).unwrap_or(None);
    let transfer = state
        .coordinator
        .ship_transfer(transfer_id, actor_id, &key)
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(transfer))))
}

async fn receive_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<ActorBody>>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let actor_id = body.map(|Json(b)| b.actor_id).unwrap_or(None);
    let transfer = state
        .coordinator
        .receive_transfer(transfer_id, actor_id, &key)
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(transfer))))
}

async fn cancel_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let transfer = state.coordinator.cancel_transfer(transfer_id, &key).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(transfer))))
}

async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transfer = state.coordinator.get_transfer(transfer_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(transfer))))
}

/// Reconciliation view of stock in the pipe.
async fn in_transit(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.coordinator.in_transit().await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(lines))))
}
