use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an inter-location stock transfer.
///
/// Shipping appends TRANSFER_OUT at the source, so from IN_TRANSIT onward the
/// stock exists in neither location's available count until receipt appends
/// TRANSFER_IN at the destination. Cancellation is only possible before any
/// movement exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Requested,
    InTransit,
    Received,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Requested => "REQUESTED",
            TransferStatus::InTransit => "IN_TRANSIT",
            TransferStatus::Received => "RECEIVED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(TransferStatus::Requested),
            "IN_TRANSIT" => Some(TransferStatus::InTransit),
            "RECEIVED" => Some(TransferStatus::Received),
            "CANCELLED" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Requested, InTransit) | (Requested, Cancelled) | (InTransit, Received)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(TransferStatus::Requested.can_transition_to(TransferStatus::InTransit));
        assert!(TransferStatus::Requested.can_transition_to(TransferStatus::Cancelled));
        assert!(TransferStatus::InTransit.can_transition_to(TransferStatus::Received));
    }

    #[test]
    fn no_cancel_after_shipment() {
        assert!(!TransferStatus::InTransit.can_transition_to(TransferStatus::Cancelled));
        assert!(!TransferStatus::Received.can_transition_to(TransferStatus::Cancelled));
    }
}
