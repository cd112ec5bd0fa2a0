use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Whether the caller may retry the same request
    pub retryable: bool,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown item: {0}")]
    UnknownItem(Uuid),

    #[error("Unknown location: {0}")]
    UnknownLocation(Uuid),

    #[error("Movement quantity delta must be nonzero")]
    InvalidQuantity,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Over-refund: {0}")]
    OverRefund(String),

    #[error("Invalid sale: {0}")]
    InvalidSale(String),

    #[error("Sale is not open: {0}")]
    SaleNotOpen(Uuid),

    #[error("Sale is not completed: {0}")]
    SaleNotCompleted(Uuid),

    #[error("Invalid transfer state: {0}")]
    InvalidTransferState(String),

    #[error("Operation with this idempotency key is already in progress")]
    OperationInProgress,

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) | Self::UnknownItem(_) | Self::UnknownLocation(_) => {
                StatusCode::NOT_FOUND
            }
            Self::ValidationError(_)
            | Self::InvalidQuantity
            | Self::InvalidSale(_)
            | Self::SaleNotOpen(_)
            | Self::SaleNotCompleted(_)
            | Self::InvalidTransferState(_) => StatusCode::BAD_REQUEST,
            Self::OverRefund(_) => StatusCode::CONFLICT,
            Self::OperationInProgress => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Whether the boundary layer should present this as "try again".
    ///
    /// `InsufficientStock` is retryable after restock; `OperationInProgress`
    /// is retryable with backoff (the caller must not resubmit as a new key).
    /// Caller logic errors are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock(_)
                | Self::OperationInProgress
                | Self::DatabaseError(_)
                | Self::InternalError(_)
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            retryable: self.is_retryable(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::UnknownItem(Uuid::new_v4()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::OverRefund("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::OperationInProgress.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::SaleNotOpen(Uuid::new_v4()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidQuantity.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn retryable_classification() {
        assert!(ServiceError::InsufficientStock("x".into()).is_retryable());
        assert!(ServiceError::OperationInProgress.is_retryable());
        assert!(!ServiceError::OverRefund("x".into()).is_retryable());
        assert!(!ServiceError::SaleNotCompleted(Uuid::new_v4()).is_retryable());
        assert!(!ServiceError::UnknownLocation(Uuid::new_v4()).is_retryable());
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("sensitive".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InsufficientStock("item abc at store 1".into()).response_message(),
            "Insufficient stock: item abc at store 1"
        );
    }
}
