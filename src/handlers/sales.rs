use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::require_idempotency_key;
use crate::services::coordinator::{CheckoutRequest, RefundRequest, SaleDraft};
use crate::{ApiResponse, AppState};

pub fn sales_router() -> Router<AppState> {
    Router::new()
        .route("/sales", post(create_sale))
        .route("/sales/:id", get(get_sale))
        .route("/sales/:id/refund", post(refund_sale))
        .route("/sales/:id/void", post(void_sale))
        .route("/checkout", post(checkout))
}

/// Open a cart: an OPEN sale holding a reservation per line.
async fn create_sale(
    State(state): State<AppState>,
    Json(draft): Json<SaleDraft>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state.coordinator.create_sale(draft).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(sale))))
}

/// Complete a sale, by id or from an inline draft.
async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let sale = state.coordinator.checkout(req, &key).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(sale))))
}

async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state.coordinator.get_sale(sale_id).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(sale))))
}

async fn refund_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let refund = state.coordinator.refund(sale_id, req, &key).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(refund))))
}

async fn void_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let key = require_idempotency_key(&headers)?;
    let sale = state.coordinator.void(sale_id, &key).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(sale))))
}
