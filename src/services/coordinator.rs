//! The transaction coordinator.
//!
//! Every operation that touches the ledger runs here as a single atomic
//! unit: all constituent movements, reservation settlements, and view
//! updates commit together or not at all. Operations take the per-key locks
//! for every (item, location) they mutate before opening their transaction,
//! and each requires a caller-supplied idempotency key.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::{DbPool, RetryPolicy};
use crate::entities::inventory_reservation::ReservationStatus;
use crate::entities::refund;
use crate::entities::refund_line;
use crate::entities::sale::{self, Entity as SaleEntity, SaleStatus};
use crate::entities::sale_line::{self, Entity as SaleLineEntity};
use crate::entities::stock_movement::{Model as Movement, MovementReason};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::idempotency::IdempotencyRegistry;
use crate::locks::{LockRegistry, StockKey};
use crate::metrics::{error_label, CHECKOUTS_COMPLETED, CHECKOUT_FAILURES, REFUNDS_COMPLETED};
use crate::services::inventory::{
    active_reservations_for_sale, reserve_in, settle_reservation,
};
use crate::services::ledger::{self, NewMovement};
use crate::services::pricing::{LineQuote, PricingResolver};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaleLineDraft {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaleDraft {
    pub location_id: Uuid,
    #[validate(length(min = 1))]
    pub lines: Vec<SaleLineDraft>,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
}

impl SaleDraft {
    fn validate_lines(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "line quantity for item {} must be at least 1",
                    line.item_id
                )));
            }
        }
        Ok(())
    }
}

/// Input to `checkout`: either an already-open cart or an inline draft
/// (reserve-then-consume in one unit).
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub sale_id: Option<Uuid>,
    pub draft: Option<SaleDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefundLineRequest {
    pub sale_line_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(length(min = 1))]
    pub lines: Vec<RefundLineRequest>,
    pub actor_id: Option<Uuid>,
}

impl RefundRequest {
    fn validate_lines(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "refund quantity for line {} must be at least 1",
                    line.sale_line_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_delta: i64,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiptRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLineResponse {
    pub id: Uuid,
    pub line_no: i32,
    pub item_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub refunded_quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleResponse {
    pub id: Uuid,
    pub location_id: Uuid,
    pub status: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lines: Vec<SaleLineResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResponse {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub status: String,
    pub total: Decimal,
    pub sale_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementResponse {
    pub movement_id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_delta: i64,
    pub reason: String,
    pub sequence: i64,
    pub occurred_at: DateTime<Utc>,
}

impl From<Movement> for MovementResponse {
    fn from(m: Movement) -> Self {
        Self {
            movement_id: m.id,
            item_id: m.item_id,
            location_id: m.location_id,
            quantity_delta: m.quantity_delta,
            reason: m.reason,
            sequence: m.sequence,
            occurred_at: m.occurred_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Totals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

/// Sale money math: gross subtotal, line discounts, tax on the net.
pub(crate) fn compute_totals(lines: &[(i64, LineQuote)], tax_rate: Decimal) -> Totals {
    let mut subtotal = Decimal::ZERO;
    let mut discount_total = Decimal::ZERO;
    for (quantity, quote) in lines {
        subtotal += quote.unit_price * Decimal::from(*quantity);
        discount_total += quote.discount;
    }
    let taxable = subtotal - discount_total;
    let tax_total = (taxable * tax_rate).round_dp(2);
    Totals {
        subtotal,
        discount_total,
        tax_total,
        total: taxable + tax_total,
    }
}

fn parse_sale_status(sale: &sale::Model) -> Result<SaleStatus, ServiceError> {
    SaleStatus::from_str(&sale.status).ok_or_else(|| {
        ServiceError::InternalError(format!("corrupt status '{}' on sale {}", sale.status, sale.id))
    })
}

fn sale_response(sale: sale::Model, lines: Vec<sale_line::Model>) -> SaleResponse {
    SaleResponse {
        id: sale.id,
        location_id: sale.location_id,
        status: sale.status,
        subtotal: sale.subtotal,
        discount_total: sale.discount_total,
        tax_total: sale.tax_total,
        total: sale.total,
        note: sale.note,
        created_at: sale.created_at,
        completed_at: sale.completed_at,
        lines: lines
            .into_iter()
            .map(|l| SaleLineResponse {
                id: l.id,
                line_no: l.line_no,
                item_id: l.item_id,
                quantity: l.quantity,
                unit_price: l.unit_price,
                discount: l.discount,
                refunded_quantity: l.refunded_quantity,
            })
            .collect(),
    }
}

/// Orchestrates every ledger-touching operation as an atomic unit.
#[derive(Clone)]
pub struct TransactionCoordinator {
    pub(crate) db_pool: Arc<DbPool>,
    pub(crate) locks: LockRegistry,
    pub(crate) idempotency: IdempotencyRegistry,
    pub(crate) events: EventSender,
    pricing: Arc<dyn PricingResolver>,
    pub(crate) retry: RetryPolicy,
    tax_rate: Decimal,
    reservation_ttl: Duration,
}

impl TransactionCoordinator {
    pub fn new(
        db_pool: Arc<DbPool>,
        locks: LockRegistry,
        events: EventSender,
        pricing: Arc<dyn PricingResolver>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            db_pool,
            locks,
            idempotency: IdempotencyRegistry::new(Duration::from_secs(cfg.idempotency_ttl_secs)),
            events,
            pricing,
            retry: RetryPolicy::from(cfg),
            tax_rate: cfg.tax_rate(),
            reservation_ttl: Duration::from_secs(cfg.reservation_ttl_secs),
        }
    }

    pub(crate) async fn emit(&self, event: Event) {
        if let Err(e) = self.events.send(event).await {
            warn!(error = %e, "Failed to send event");
        }
    }

    /// Opens a cart: an OPEN sale with priced lines and one live reservation
    /// per line.
    #[instrument(skip(self, draft), fields(location_id = %draft.location_id))]
    pub async fn create_sale(&self, draft: SaleDraft) -> Result<SaleResponse, ServiceError> {
        draft.validate_lines()?;

        let mut quotes = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            quotes.push(self.pricing.resolve(line.item_id, line.quantity).await?);
        }

        let keys: Vec<StockKey> = draft
            .lines
            .iter()
            .map(|l| (l.item_id, draft.location_id))
            .collect();
        let _guards = self.locks.acquire_many(&keys).await;

        let response = self
            .retry
            .run(|| self.create_sale_once(&draft, &quotes))
            .await?;

        info!(sale_id = %response.id, lines = response.lines.len(), "Sale opened");
        self.emit(Event::SaleOpened {
            sale_id: response.id,
            location_id: response.location_id,
        })
        .await;

        Ok(response)
    }

    async fn create_sale_once(
        &self,
        draft: &SaleDraft,
        quotes: &[LineQuote],
    ) -> Result<SaleResponse, ServiceError> {
        let txn = self.db_pool.begin().await?;
        ledger::ensure_location(&txn, draft.location_id).await?;

        let now = Utc::now();
        let sale_id = Uuid::new_v4();
        let priced: Vec<(i64, LineQuote)> = draft
            .lines
            .iter()
            .zip(quotes)
            .map(|(l, q)| (l.quantity, *q))
            .collect();
        let totals = compute_totals(&priced, self.tax_rate);

        let sale = sale::ActiveModel {
            id: Set(sale_id),
            location_id: Set(draft.location_id),
            status: Set(SaleStatus::Open.as_str().to_string()),
            subtotal: Set(totals.subtotal),
            discount_total: Set(totals.discount_total),
            tax_total: Set(totals.tax_total),
            total: Set(totals.total),
            note: Set(draft.note.clone()),
            actor_id: Set(draft.actor_id),
            created_at: Set(now),
            completed_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (idx, (line, quote)) in draft.lines.iter().zip(quotes).enumerate() {
            // Reservation first: it validates the references and the
            // available quantity for this line.
            reserve_in(
                &txn,
                line.item_id,
                draft.location_id,
                line.quantity,
                Some(sale_id),
                self.reservation_ttl,
            )
            .await?;

            let saved = sale_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                line_no: Set(idx as i32 + 1),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                unit_price: Set(quote.unit_price),
                discount: Set(quote.discount),
                refunded_quantity: Set(0),
            }
            .insert(&txn)
            .await?;
            lines.push(saved);
        }

        txn.commit().await?;
        Ok(sale_response(sale, lines))
    }

    /// Completes a sale: consumes each line's reservation (or performs an
    /// immediate reserve-then-consume), appends one SALE movement per line,
    /// and marks the sale COMPLETED.
    #[instrument(skip(self, req))]
    pub async fn checkout(
        &self,
        req: CheckoutRequest,
        idempotency_key: &str,
    ) -> Result<SaleResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<SaleResponse>("checkout", idempotency_key)?
        {
            info!(sale_id = %stored.id, "Replayed checkout from idempotency store");
            return Ok(stored);
        }

        let result = self.checkout_guarded(req).await;
        match &result {
            Ok(response) => {
                if let Err(e) = self
                    .idempotency
                    .complete("checkout", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent checkout result");
                }
                CHECKOUTS_COMPLETED.inc();
                info!(sale_id = %response.id, total = %response.total, "Checkout completed");
                self.emit(Event::SaleCompleted {
                    sale_id: response.id,
                    location_id: response.location_id,
                    line_count: response.lines.len(),
                })
                .await;
            }
            Err(e) => {
                self.idempotency.abort("checkout", idempotency_key);
                CHECKOUT_FAILURES.with_label_values(&[error_label(e)]).inc();
            }
        }
        result
    }

    async fn checkout_guarded(&self, req: CheckoutRequest) -> Result<SaleResponse, ServiceError> {
        match (req.sale_id, req.draft) {
            (Some(sale_id), None) => self.checkout_open_sale(sale_id).await,
            (None, Some(draft)) => self.checkout_draft(draft).await,
            _ => Err(ServiceError::InvalidSale(
                "provide exactly one of sale_id or draft".to_string(),
            )),
        }
    }

    async fn checkout_open_sale(&self, sale_id: Uuid) -> Result<SaleResponse, ServiceError> {
        // Probe outside the transaction only to learn the lock keys.
        let sale = SaleEntity::find_by_id(sale_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .all(&*self.db_pool)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidSale(format!(
                "sale {} has no lines",
                sale_id
            )));
        }

        let keys: Vec<StockKey> = lines.iter().map(|l| (l.item_id, sale.location_id)).collect();
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry
            .run(|| self.checkout_open_sale_once(sale_id))
            .await
    }

    async fn checkout_open_sale_once(&self, sale_id: Uuid) -> Result<SaleResponse, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let sale = SaleEntity::find_by_id(sale_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let status = parse_sale_status(&sale)?;
        if status != SaleStatus::Open {
            return Err(ServiceError::SaleNotOpen(sale_id));
        }

        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .order_by_asc(sale_line::Column::LineNo)
            .all(&txn)
            .await?;

        let mut reservations = active_reservations_for_sale(&txn, sale_id).await?;
        let now = Utc::now();

        for line in &lines {
            // Consume this line's hold if it is still live; if the sweep
            // already reclaimed it, fall back to an immediate
            // reserve-then-consume (the append guard enforces availability).
            let matched = reservations
                .iter()
                .position(|r| r.item_id == line.item_id && r.quantity == line.quantity);
            if let Some(idx) = matched {
                let reservation = reservations.remove(idx);
                settle_reservation(&txn, &reservation, ReservationStatus::Consumed).await?;
            }

            ledger::append(
                &txn,
                NewMovement {
                    item_id: line.item_id,
                    location_id: sale.location_id,
                    quantity_delta: -line.quantity,
                    reason: MovementReason::Sale,
                    reference_id: Some(sale_id),
                    actor_id: sale.actor_id,
                    note: None,
                },
            )
            .await?;
        }

        // No transition may leave holds orphaned: release anything left.
        for leftover in &reservations {
            settle_reservation(&txn, leftover, ReservationStatus::Released).await?;
        }

        let mut sale_active: sale::ActiveModel = sale.into();
        sale_active.status = Set(SaleStatus::Completed.as_str().to_string());
        sale_active.completed_at = Set(Some(now));
        let updated = sale_active.update(&txn).await?;

        txn.commit().await?;
        Ok(sale_response(updated, lines))
    }

    async fn checkout_draft(&self, draft: SaleDraft) -> Result<SaleResponse, ServiceError> {
        draft.validate_lines()?;

        let mut quotes = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            quotes.push(self.pricing.resolve(line.item_id, line.quantity).await?);
        }

        let keys: Vec<StockKey> = draft
            .lines
            .iter()
            .map(|l| (l.item_id, draft.location_id))
            .collect();
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry
            .run(|| self.checkout_draft_once(&draft, &quotes))
            .await
    }

    async fn checkout_draft_once(
        &self,
        draft: &SaleDraft,
        quotes: &[LineQuote],
    ) -> Result<SaleResponse, ServiceError> {
        let txn = self.db_pool.begin().await?;
        ledger::ensure_location(&txn, draft.location_id).await?;

        let now = Utc::now();
        let sale_id = Uuid::new_v4();
        let priced: Vec<(i64, LineQuote)> = draft
            .lines
            .iter()
            .zip(quotes)
            .map(|(l, q)| (l.quantity, *q))
            .collect();
        let totals = compute_totals(&priced, self.tax_rate);

        let sale = sale::ActiveModel {
            id: Set(sale_id),
            location_id: Set(draft.location_id),
            status: Set(SaleStatus::Completed.as_str().to_string()),
            subtotal: Set(totals.subtotal),
            discount_total: Set(totals.discount_total),
            tax_total: Set(totals.tax_total),
            total: Set(totals.total),
            note: Set(draft.note.clone()),
            actor_id: Set(draft.actor_id),
            created_at: Set(now),
            completed_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (idx, (line, quote)) in draft.lines.iter().zip(quotes).enumerate() {
            let saved = sale_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                line_no: Set(idx as i32 + 1),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                unit_price: Set(quote.unit_price),
                discount: Set(quote.discount),
                refunded_quantity: Set(0),
            }
            .insert(&txn)
            .await?;
            lines.push(saved);

            ledger::append(
                &txn,
                NewMovement {
                    item_id: line.item_id,
                    location_id: draft.location_id,
                    quantity_delta: -line.quantity,
                    reason: MovementReason::Sale,
                    reference_id: Some(sale_id),
                    actor_id: draft.actor_id,
                    note: None,
                },
            )
            .await?;
        }

        txn.commit().await?;
        Ok(sale_response(sale, lines))
    }

    /// Refunds quantities against a completed sale; each refunded unit goes
    /// back on hand through a REFUND movement.
    #[instrument(skip(self, req))]
    pub async fn refund(
        &self,
        sale_id: Uuid,
        req: RefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<RefundResponse>("refund", idempotency_key)?
        {
            info!(refund_id = %stored.id, "Replayed refund from idempotency store");
            return Ok(stored);
        }

        let result = self.refund_guarded(sale_id, &req).await;
        match &result {
            Ok(response) => {
                if let Err(e) = self.idempotency.complete("refund", idempotency_key, response) {
                    warn!(error = %e, "Failed to store idempotent refund result");
                }
                REFUNDS_COMPLETED.inc();
                info!(
                    refund_id = %response.id,
                    sale_id = %sale_id,
                    total = %response.total,
                    "Refund completed"
                );
                self.emit(Event::RefundCompleted {
                    refund_id: response.id,
                    sale_id,
                })
                .await;
            }
            Err(_) => {
                self.idempotency.abort("refund", idempotency_key);
            }
        }
        result
    }

    async fn refund_guarded(
        &self,
        sale_id: Uuid,
        req: &RefundRequest,
    ) -> Result<RefundResponse, ServiceError> {
        req.validate_lines()?;

        let sale = SaleEntity::find_by_id(sale_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .all(&*self.db_pool)
            .await?;

        let by_id: HashMap<Uuid, &sale_line::Model> = lines.iter().map(|l| (l.id, l)).collect();
        let mut keys = Vec::with_capacity(req.lines.len());
        for line_req in &req.lines {
            let line = by_id.get(&line_req.sale_line_id).ok_or_else(|| {
                ServiceError::InvalidSale(format!(
                    "line {} does not belong to sale {}",
                    line_req.sale_line_id, sale_id
                ))
            })?;
            keys.push((line.item_id, sale.location_id));
        }
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry.run(|| self.refund_once(sale_id, req)).await
    }

    async fn refund_once(
        &self,
        sale_id: Uuid,
        req: &RefundRequest,
    ) -> Result<RefundResponse, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let sale = SaleEntity::find_by_id(sale_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let status = parse_sale_status(&sale)?;
        if !status.is_refundable() {
            return Err(ServiceError::SaleNotCompleted(sale_id));
        }

        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .all(&txn)
            .await?;
        let mut by_id: HashMap<Uuid, sale_line::Model> =
            lines.into_iter().map(|l| (l.id, l)).collect();

        let now = Utc::now();
        let refund_id = Uuid::new_v4();
        let mut refund_total = Decimal::ZERO;

        for line_req in &req.lines {
            let line = by_id.get_mut(&line_req.sale_line_id).ok_or_else(|| {
                ServiceError::InvalidSale(format!(
                    "line {} does not belong to sale {}",
                    line_req.sale_line_id, sale_id
                ))
            })?;

            let refundable = line.refundable_quantity();
            if line_req.quantity > refundable {
                return Err(ServiceError::OverRefund(format!(
                    "line {}: requested {}, only {} refundable",
                    line.id, line_req.quantity, refundable
                )));
            }

            let quantity = line_req.quantity;
            let proportional_discount = if line.quantity > 0 {
                (line.discount * Decimal::from(quantity) / Decimal::from(line.quantity)).round_dp(2)
            } else {
                Decimal::ZERO
            };
            refund_total += (line.unit_price * Decimal::from(quantity) - proportional_discount)
                .round_dp(2);

            refund_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                refund_id: Set(refund_id),
                sale_line_id: Set(line.id),
                item_id: Set(line.item_id),
                quantity: Set(quantity),
            }
            .insert(&txn)
            .await?;

            let new_refunded = line.refunded_quantity + quantity;
            let mut line_active: sale_line::ActiveModel = line.clone().into();
            line_active.refunded_quantity = Set(new_refunded);
            let updated = line_active.update(&txn).await?;
            *line = updated;

            ledger::append(
                &txn,
                NewMovement {
                    item_id: line.item_id,
                    location_id: sale.location_id,
                    quantity_delta: quantity,
                    reason: MovementReason::Refund,
                    reference_id: Some(refund_id),
                    actor_id: req.actor_id,
                    note: None,
                },
            )
            .await?;
        }

        let fully_refunded = by_id
            .values()
            .all(|line| line.refunded_quantity >= line.quantity);
        let new_status = if fully_refunded {
            SaleStatus::Refunded
        } else {
            SaleStatus::PartiallyRefunded
        };
        if !status.can_transition_to(new_status) {
            return Err(ServiceError::InternalError(format!(
                "illegal sale transition {} -> {}",
                status.as_str(),
                new_status.as_str()
            )));
        }

        let refund = refund::ActiveModel {
            id: Set(refund_id),
            sale_id: Set(sale_id),
            status: Set("completed".to_string()),
            total: Set(refund_total),
            actor_id: Set(req.actor_id),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut sale_active: sale::ActiveModel = sale.into();
        sale_active.status = Set(new_status.as_str().to_string());
        let updated_sale = sale_active.update(&txn).await?;

        txn.commit().await?;

        Ok(RefundResponse {
            id: refund.id,
            sale_id,
            status: refund.status,
            total: refund.total,
            sale_status: updated_sale.status,
            created_at: refund.created_at,
        })
    }

    /// Voids an OPEN sale: releases its holds, appends nothing.
    #[instrument(skip(self))]
    pub async fn void(
        &self,
        sale_id: Uuid,
        idempotency_key: &str,
    ) -> Result<SaleResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<SaleResponse>("void", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.void_guarded(sale_id).await;
        match &result {
            Ok(response) => {
                if let Err(e) = self.idempotency.complete("void", idempotency_key, response) {
                    warn!(error = %e, "Failed to store idempotent void result");
                }
                info!(sale_id = %sale_id, "Sale voided");
                self.emit(Event::SaleVoided(sale_id)).await;
            }
            Err(_) => {
                self.idempotency.abort("void", idempotency_key);
            }
        }
        result
    }

    async fn void_guarded(&self, sale_id: Uuid) -> Result<SaleResponse, ServiceError> {
        let reservations = active_reservations_for_sale(&*self.db_pool, sale_id).await?;
        let keys: Vec<StockKey> = reservations
            .iter()
            .map(|r| (r.item_id, r.location_id))
            .collect();
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry.run(|| self.void_once(sale_id)).await
    }

    async fn void_once(&self, sale_id: Uuid) -> Result<SaleResponse, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let sale = SaleEntity::find_by_id(sale_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let status = parse_sale_status(&sale)?;
        if status != SaleStatus::Open {
            return Err(ServiceError::SaleNotOpen(sale_id));
        }

        for reservation in active_reservations_for_sale(&txn, sale_id).await? {
            settle_reservation(&txn, &reservation, ReservationStatus::Released).await?;
        }

        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .order_by_asc(sale_line::Column::LineNo)
            .all(&txn)
            .await?;

        let mut sale_active: sale::ActiveModel = sale.into();
        sale_active.status = Set(SaleStatus::Voided.as_str().to_string());
        let updated = sale_active.update(&txn).await?;

        txn.commit().await?;
        Ok(sale_response(updated, lines))
    }

    /// Administrative correction: always permitted regardless of sale or
    /// transfer state, always exactly one audit movement.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, location_id = %req.location_id))]
    pub async fn adjust(
        &self,
        req: AdjustmentRequest,
        idempotency_key: &str,
    ) -> Result<MovementResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<MovementResponse>("adjust", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.adjust_guarded(&req).await;
        match &result {
            Ok(response) => {
                if let Err(e) = self.idempotency.complete("adjust", idempotency_key, response) {
                    warn!(error = %e, "Failed to store idempotent adjustment result");
                }
                info!(
                    movement_id = %response.movement_id,
                    quantity_delta = req.quantity_delta,
                    "Inventory adjusted"
                );
                self.emit(Event::StockAdjusted {
                    item_id: req.item_id,
                    location_id: req.location_id,
                    quantity_delta: req.quantity_delta,
                })
                .await;
            }
            Err(_) => {
                self.idempotency.abort("adjust", idempotency_key);
            }
        }
        result
    }

    async fn adjust_guarded(&self, req: &AdjustmentRequest) -> Result<MovementResponse, ServiceError> {
        if req.quantity_delta == 0 {
            return Err(ServiceError::InvalidQuantity);
        }

        let _guard = self.locks.acquire(req.item_id, req.location_id).await;
        self.retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;
                let movement = ledger::append(
                    &txn,
                    NewMovement {
                        item_id: req.item_id,
                        location_id: req.location_id,
                        quantity_delta: req.quantity_delta,
                        reason: MovementReason::Adjustment,
                        reference_id: None,
                        actor_id: req.actor_id,
                        note: req.note.clone(),
                    },
                )
                .await?;
                txn.commit().await?;
                Ok(MovementResponse::from(movement))
            })
            .await
    }

    /// Purchase receipt: stock enters the system.
    #[instrument(skip(self, req), fields(item_id = %req.item_id, location_id = %req.location_id))]
    pub async fn receive(
        &self,
        req: ReceiptRequest,
        idempotency_key: &str,
    ) -> Result<MovementResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<MovementResponse>("receive", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.receive_guarded(&req).await;
        match &result {
            Ok(response) => {
                if let Err(e) = self
                    .idempotency
                    .complete("receive", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent receipt result");
                }
                info!(
                    movement_id = %response.movement_id,
                    quantity = req.quantity,
                    "Purchase receipt posted"
                );
                self.emit(Event::StockReceived {
                    item_id: req.item_id,
                    location_id: req.location_id,
                    quantity: req.quantity,
                })
                .await;
            }
            Err(_) => {
                self.idempotency.abort("receive", idempotency_key);
            }
        }
        result
    }

    async fn receive_guarded(&self, req: &ReceiptRequest) -> Result<MovementResponse, ServiceError> {
        req.validate()?;

        let _guard = self.locks.acquire(req.item_id, req.location_id).await;
        self.retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;
                let movement = ledger::append(
                    &txn,
                    NewMovement {
                        item_id: req.item_id,
                        location_id: req.location_id,
                        quantity_delta: req.quantity,
                        reason: MovementReason::PurchaseReceipt,
                        reference_id: req.reference_id,
                        actor_id: req.actor_id,
                        note: req.note.clone(),
                    },
                )
                .await?;
                txn.commit().await?;
                Ok(MovementResponse::from(movement))
            })
            .await
    }

    /// Reads one sale with its lines.
    #[instrument(skip(self))]
    pub async fn get_sale(&self, sale_id: Uuid) -> Result<SaleResponse, ServiceError> {
        let sale = SaleEntity::find_by_id(sale_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
        let lines = SaleLineEntity::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .order_by_asc(sale_line::Column::LineNo)
            .all(&*self.db_pool)
            .await?;
        Ok(sale_response(sale, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_tax_on_net_of_discount() {
        let lines = vec![
            (
                2,
                LineQuote {
                    unit_price: dec!(10.00),
                    discount: dec!(2.00),
                },
            ),
            (
                1,
                LineQuote {
                    unit_price: dec!(5.50),
                    discount: Decimal::ZERO,
                },
            ),
        ];
        let totals = compute_totals(&lines, dec!(0.05));
        assert_eq!(totals.subtotal, dec!(25.50));
        assert_eq!(totals.discount_total, dec!(2.00));
        assert_eq!(totals.tax_total, dec!(1.18)); // 23.50 * 0.05 = 1.175 -> 1.18
        assert_eq!(totals.total, dec!(24.68));
    }

    #[test]
    fn totals_empty_sale_is_zero() {
        let totals = compute_totals(&[], dec!(0.05));
        assert_eq!(totals.total, Decimal::ZERO);
        assert_eq!(totals.tax_total, Decimal::ZERO);
    }
}
