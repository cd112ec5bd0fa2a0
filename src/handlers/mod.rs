use axum::http::HeaderMap;
use axum::Router;

use crate::errors::ServiceError;
use crate::AppState;

pub mod health;
pub mod inventory;
pub mod ledger;
pub mod sales;
pub mod transfers;

/// Extracts the mandatory `Idempotency-Key` header for mutating operations.
pub(crate) fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::ValidationError("Idempotency-Key header is required".to_string())
        })
}

/// All v1 API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(sales::sales_router())
        .merge(inventory::inventory_router())
        .merge(ledger::ledger_router())
        .merge(transfers::transfers_router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn idempotency_key_is_required() {
        let headers = HeaderMap::new();
        assert!(require_idempotency_key(&headers).is_err());
    }

    #[test]
    fn idempotency_key_is_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("idempotency-key", HeaderValue::from_static("  abc  "));
        assert_eq!(require_idempotency_key(&headers).unwrap(), "abc");
    }

    #[test]
    fn blank_idempotency_key_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("idempotency-key", HeaderValue::from_static("   "));
        assert!(require_idempotency_key(&headers).is_err());
    }
}
