use crate::errors::ServiceError;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref CHECKOUTS_COMPLETED: IntCounter = register_int_counter!(
        "pos_checkouts_completed_total",
        "Total number of completed checkouts"
    )
    .expect("metric can be created");
    pub static ref CHECKOUT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "pos_checkout_failures_total",
        "Total number of failed checkouts",
        &["error_type"]
    )
    .expect("metric can be created");
    pub static ref REFUNDS_COMPLETED: IntCounter = register_int_counter!(
        "pos_refunds_completed_total",
        "Total number of completed refunds"
    )
    .expect("metric can be created");
    pub static ref MOVEMENTS_APPENDED: IntCounterVec = register_int_counter_vec!(
        "pos_stock_movements_total",
        "Total stock movements appended to the ledger",
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref RESERVATIONS_EXPIRED: IntCounter = register_int_counter!(
        "pos_reservations_expired_total",
        "Reservations reclaimed by the expiry sweep"
    )
    .expect("metric can be created");
}

/// Stable label for failure counters.
pub fn error_label(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::InsufficientStock(_) => "insufficient_stock",
        ServiceError::OverRefund(_) => "over_refund",
        ServiceError::InvalidSale(_) => "invalid_sale",
        ServiceError::SaleNotOpen(_) => "sale_not_open",
        ServiceError::SaleNotCompleted(_) => "sale_not_completed",
        ServiceError::InvalidTransferState(_) => "invalid_transfer_state",
        ServiceError::OperationInProgress => "operation_in_progress",
        ServiceError::UnknownItem(_) => "unknown_item",
        ServiceError::UnknownLocation(_) => "unknown_location",
        ServiceError::InvalidQuantity => "invalid_quantity",
        ServiceError::ValidationError(_) => "validation_error",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::DatabaseError(_) => "database_error",
        ServiceError::EventError(_) => "event_error",
        ServiceError::InternalError(_) | ServiceError::Other(_) => "internal_error",
    }
}

/// Renders all registered metrics in Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_labels_are_stable() {
        assert_eq!(
            error_label(&ServiceError::InsufficientStock("x".into())),
            "insufficient_stock"
        );
        assert_eq!(
            error_label(&ServiceError::OperationInProgress),
            "operation_in_progress"
        );
    }

    #[test]
    fn render_includes_registered_counters() {
        CHECKOUTS_COMPLETED.inc();
        let text = render().unwrap();
        assert!(text.contains("pos_checkouts_completed_total"));
    }
}
