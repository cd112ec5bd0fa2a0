use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a POS sale.
///
/// OPEN is the cart; COMPLETED is the commit point after which the sale is
/// immutable except for refund-driven status changes. VOIDED and REFUNDED are
/// terminal; PARTIALLY_REFUNDED admits further refunds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleStatus {
    Open,
    Completed,
    Voided,
    Refunded,
    PartiallyRefunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "OPEN",
            SaleStatus::Completed => "COMPLETED",
            SaleStatus::Voided => "VOIDED",
            SaleStatus::Refunded => "REFUNDED",
            SaleStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(SaleStatus::Open),
            "COMPLETED" => Some(SaleStatus::Completed),
            "VOIDED" => Some(SaleStatus::Voided),
            "REFUNDED" => Some(SaleStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(SaleStatus::PartiallyRefunded),
            _ => None,
        }
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        use SaleStatus::*;
        matches!(
            (self, next),
            (Open, Completed)
                | (Open, Voided)
                | (Completed, Refunded)
                | (Completed, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
                | (PartiallyRefunded, PartiallyRefunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Voided | SaleStatus::Refunded)
    }

    /// Statuses a refund may be taken against.
    pub fn is_refundable(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::PartiallyRefunded)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub location_id: Uuid,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_transitions() {
        assert!(SaleStatus::Open.can_transition_to(SaleStatus::Completed));
        assert!(SaleStatus::Open.can_transition_to(SaleStatus::Voided));
        assert!(!SaleStatus::Open.can_transition_to(SaleStatus::Refunded));
    }

    #[test]
    fn voided_is_unreachable_from_completed() {
        assert!(!SaleStatus::Completed.can_transition_to(SaleStatus::Voided));
    }

    #[test]
    fn partial_refund_is_not_terminal() {
        assert!(!SaleStatus::PartiallyRefunded.is_terminal());
        assert!(SaleStatus::PartiallyRefunded.can_transition_to(SaleStatus::Refunded));
        assert!(SaleStatus::PartiallyRefunded.is_refundable());
    }

    #[test]
    fn terminal_states() {
        assert!(SaleStatus::Voided.is_terminal());
        assert!(SaleStatus::Refunded.is_terminal());
        assert!(!SaleStatus::Refunded.is_refundable());
    }
}
