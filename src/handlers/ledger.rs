use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

pub fn ledger_router() -> Router<AppState> {
    Router::new().route("/ledger/:item_id/:location_id", get(history))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// Ordered movement history for audit replay.
async fn history(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
    Query(range): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let movements = state
        .ledger
        .history(item_id, location_id, range.from, range.to)
        .await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(movements))))
}
