use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a movement happened. Stored as a string column, matched exhaustively
/// everywhere it is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementReason {
    Sale,
    Refund,
    TransferOut,
    TransferIn,
    Adjustment,
    PurchaseReceipt,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Sale => "SALE",
            MovementReason::Refund => "REFUND",
            MovementReason::TransferOut => "TRANSFER_OUT",
            MovementReason::TransferIn => "TRANSFER_IN",
            MovementReason::Adjustment => "ADJUSTMENT",
            MovementReason::PurchaseReceipt => "PURCHASE_RECEIPT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SALE" => Some(MovementReason::Sale),
            "REFUND" => Some(MovementReason::Refund),
            "TRANSFER_OUT" => Some(MovementReason::TransferOut),
            "TRANSFER_IN" => Some(MovementReason::TransferIn),
            "ADJUSTMENT" => Some(MovementReason::Adjustment),
            "PURCHASE_RECEIPT" => Some(MovementReason::PurchaseReceipt),
            _ => None,
        }
    }
}

/// One immutable signed quantity change for one item at one location.
///
/// Rows are only ever inserted, and only by the transaction coordinator;
/// corrections are new compensating movements. `(item_id, location_id,
/// sequence)` is unique and `sequence` is monotonic per pair, so replaying
/// history in `(occurred_at, sequence)` order is deterministic.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_delta: i64,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub sequence: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
