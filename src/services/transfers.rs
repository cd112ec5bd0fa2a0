//! Inter-location transfer protocol.
//!
//! REQUESTED places no movements; shipping appends TRANSFER_OUT at the
//! source and receipt appends TRANSFER_IN at the destination, so a RECEIVED
//! transfer's movements always sum to zero across both locations. While
//! IN_TRANSIT the stock is "in the pipe": counted as available nowhere, but
//! queryable for reconciliation.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::stock_movement::MovementReason;
use crate::entities::transfer::{self, Entity as TransferEntity, TransferStatus};
use crate::entities::transfer_line::{self, Entity as TransferLineEntity};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::locks::StockKey;
use crate::services::coordinator::TransactionCoordinator;
use crate::services::ledger::{self, NewMovement};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferLineDraft {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferDraft {
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[validate(length(min = 1))]
    pub lines: Vec<TransferLineDraft>,
    pub note: Option<String>,
}

impl TransferDraft {
    fn validate_lines(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.from_location_id == self.to_location_id {
            return Err(ServiceError::ValidationError(
                "transfer source and destination must differ".to_string(),
            ));
        }
        for line in &self.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "transfer quantity for item {} must be at least 1",
                    line.item_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLineResponse {
    pub id: Uuid,
    pub item_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub lines: Vec<TransferLineResponse>,
}

/// One in-the-pipe quantity, for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InTransitLine {
    pub transfer_id: Uuid,
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i64,
    pub shipped_at: Option<DateTime<Utc>>,
}

fn transfer_response(
    model: transfer::Model,
    lines: Vec<transfer_line::Model>,
) -> TransferResponse {
    TransferResponse {
        id: model.id,
        from_location_id: model.from_location_id,
        to_location_id: model.to_location_id,
        status: model.status,
        note: model.note,
        requested_at: model.requested_at,
        shipped_at: model.shipped_at,
        received_at: model.received_at,
        cancelled_at: model.cancelled_at,
        lines: lines
            .into_iter()
            .map(|l| TransferLineResponse {
                id: l.id,
                item_id: l.item_id,
                quantity: l.quantity,
            })
            .collect(),
    }
}

fn parse_transfer_status(model: &transfer::Model) -> Result<TransferStatus, ServiceError> {
    TransferStatus::from_str(&model.status).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "corrupt status '{}' on transfer {}",
            model.status, model.id
        ))
    })
}

impl TransactionCoordinator {
    /// Opens a transfer in REQUESTED; nothing moves yet.
    #[instrument(skip(self, draft))]
    pub async fn request_transfer(
        &self,
        draft: TransferDraft,
        idempotency_key: &str,
    ) -> Result<TransferResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<TransferResponse>("transfer-request", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.request_transfer_guarded(&draft).await;
        match &result {
            Ok(response) => {
                if let Err(e) =
                    self.idempotency
                        .complete("transfer-request", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent transfer request");
                }
                info!(transfer_id = %response.id, "Transfer requested");
                self.emit(Event::TransferRequested(response.id)).await;
            }
            Err(_) => {
                self.idempotency.abort("transfer-request", idempotency_key);
            }
        }
        result
    }

    async fn request_transfer_guarded(
        &self,
        draft: &TransferDraft,
    ) -> Result<TransferResponse, ServiceError> {
        draft.validate_lines()?;

        self.retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;
                ledger::ensure_location(&txn, draft.from_location_id).await?;
                ledger::ensure_location(&txn, draft.to_location_id).await?;
                for line in &draft.lines {
                    ledger::ensure_item(&txn, line.item_id).await?;
                }

                let now = Utc::now();
                let transfer = transfer::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    from_location_id: Set(draft.from_location_id),
                    to_location_id: Set(draft.to_location_id),
                    status: Set(TransferStatus::Requested.as_str().to_string()),
                    note: Set(draft.note.clone()),
                    requested_at: Set(now),
                    shipped_at: Set(None),
                    received_at: Set(None),
                    cancelled_at: Set(None),
                }
                .insert(&txn)
                .await?;

                let mut lines = Vec::with_capacity(draft.lines.len());
                for line in &draft.lines {
                    let saved = transfer_line::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        transfer_id: Set(transfer.id),
                        item_id: Set(line.item_id),
                        quantity: Set(line.quantity),
                    }
                    .insert(&txn)
                    .await?;
                    lines.push(saved);
                }

                txn.commit().await?;
                Ok(transfer_response(transfer, lines))
            })
            .await
    }

    /// Ships a REQUESTED transfer: TRANSFER_OUT movements at the source,
    /// on-hand drops immediately.
    #[instrument(skip(self))]
    pub async fn ship_transfer(
        &self,
        transfer_id: Uuid,
        actor_id: Option<Uuid>,
        idempotency_key: &str,
    ) -> Result<TransferResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<TransferResponse>("transfer-ship", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.ship_transfer_guarded(transfer_id, actor_id).await;
        match &result {
            Ok(response) => {
                if let Err(e) =
                    self.idempotency
                        .complete("transfer-ship", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent transfer shipment");
                }
                info!(transfer_id = %transfer_id, "Transfer shipped");
                self.emit(Event::TransferShipped(transfer_id)).await;
            }
            Err(_) => {
                self.idempotency.abort("transfer-ship", idempotency_key);
            }
        }
        result
    }

    async fn ship_transfer_guarded(
        &self,
        transfer_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<TransferResponse, ServiceError> {
        let (transfer, lines) = self.load_transfer(transfer_id).await?;

        let keys: Vec<StockKey> = lines
            .iter()
            .map(|l| (l.item_id, transfer.from_location_id))
            .collect();
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;

                let transfer = TransferEntity::find_by_id(transfer_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Transfer {} not found", transfer_id))
                    })?;
                let status = parse_transfer_status(&transfer)?;
                if !status.can_transition_to(TransferStatus::InTransit) {
                    return Err(ServiceError::InvalidTransferState(format!(
                        "transfer {} is {}, cannot ship",
                        transfer_id,
                        status.as_str()
                    )));
                }

                let lines = TransferLineEntity::find()
                    .filter(transfer_line::Column::TransferId.eq(transfer_id))
                    .all(&txn)
                    .await?;

                for line in &lines {
                    ledger::append(
                        &txn,
                        NewMovement {
                            item_id: line.item_id,
                            location_id: transfer.from_location_id,
                            quantity_delta: -line.quantity,
                            reason: MovementReason::TransferOut,
                            reference_id: Some(transfer_id),
                            actor_id,
                            note: None,
                        },
                    )
                    .await?;
                }

                let mut active: transfer::ActiveModel = transfer.into();
                active.status = Set(TransferStatus::InTransit.as_str().to_string());
                active.shipped_at = Set(Some(Utc::now()));
                let updated = active.update(&txn).await?;

                txn.commit().await?;
                Ok(transfer_response(updated, lines))
            })
            .await
    }

    /// Receives an IN_TRANSIT transfer: TRANSFER_IN movements at the
    /// destination. Receipt is always in full.
    #[instrument(skip(self))]
    pub async fn receive_transfer(
        &self,
        transfer_id: Uuid,
        actor_id: Option<Uuid>,
        idempotency_key: &str,
    ) -> Result<TransferResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<TransferResponse>("transfer-receive", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self.receive_transfer_guarded(transfer_id, actor_id).await;
        match &result {
            Ok(response) => {
                if let Err(e) =
                    self.idempotency
                        .complete("transfer-receive", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent transfer receipt");
                }
                info!(transfer_id = %transfer_id, "Transfer received");
                self.emit(Event::TransferReceived(transfer_id)).await;
            }
            Err(_) => {
                self.idempotency.abort("transfer-receive", idempotency_key);
            }
        }
        result
    }

    async fn receive_transfer_guarded(
        &self,
        transfer_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<TransferResponse, ServiceError> {
        let (transfer, lines) = self.load_transfer(transfer_id).await?;

        let keys: Vec<StockKey> = lines
            .iter()
            .map(|l| (l.item_id, transfer.to_location_id))
            .collect();
        let _guards = self.locks.acquire_many(&keys).await;

        self.retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;

                let transfer = TransferEntity::find_by_id(transfer_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Transfer {} not found", transfer_id))
                    })?;
                let status = parse_transfer_status(&transfer)?;
                if !status.can_transition_to(TransferStatus::Received) {
                    return Err(ServiceError::InvalidTransferState(format!(
                        "transfer {} is {}, cannot receive",
                        transfer_id,
                        status.as_str()
                    )));
                }

                let lines = TransferLineEntity::find()
                    .filter(transfer_line::Column::TransferId.eq(transfer_id))
                    .all(&txn)
                    .await?;

                for line in &lines {
                    ledger::append(
                        &txn,
                        NewMovement {
                            item_id: line.item_id,
                            location_id: transfer.to_location_id,
                            quantity_delta: line.quantity,
                            reason: MovementReason::TransferIn,
                            reference_id: Some(transfer_id),
                            actor_id,
                            note: None,
                        },
                    )
                    .await?;
                }

                let mut active: transfer::ActiveModel = transfer.into();
                active.status = Set(TransferStatus::Received.as_str().to_string());
                active.received_at = Set(Some(Utc::now()));
                let updated = active.update(&txn).await?;

                txn.commit().await?;
                Ok(transfer_response(updated, lines))
            })
            .await
    }

    /// Cancels a transfer before shipment; zero net movements.
    #[instrument(skip(self))]
    pub async fn cancel_transfer(
        &self,
        transfer_id: Uuid,
        idempotency_key: &str,
    ) -> Result<TransferResponse, ServiceError> {
        if let Some(stored) = self
            .idempotency
            .begin::<TransferResponse>("transfer-cancel", idempotency_key)?
        {
            return Ok(stored);
        }

        let result = self
            .retry
            .run(|| async move {
                let txn = self.db_pool.begin().await?;

                let transfer = TransferEntity::find_by_id(transfer_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Transfer {} not found", transfer_id))
                    })?;
                let status = parse_transfer_status(&transfer)?;
                if !status.can_transition_to(TransferStatus::Cancelled) {
                    return Err(ServiceError::InvalidTransferState(format!(
                        "transfer {} is {}, cannot cancel",
                        transfer_id,
                        status.as_str()
                    )));
                }

                let lines = TransferLineEntity::find()
                    .filter(transfer_line::Column::TransferId.eq(transfer_id))
                    .all(&txn)
                    .await?;

                let mut active: transfer::ActiveModel = transfer.into();
                active.status = Set(TransferStatus::Cancelled.as_str().to_string());
                active.cancelled_at = Set(Some(Utc::now()));
                let updated = active.update(&txn).await?;

                txn.commit().await?;
                Ok(transfer_response(updated, lines))
            })
            .await;

        match &result {
            Ok(response) => {
                if let Err(e) =
                    self.idempotency
                        .complete("transfer-cancel", idempotency_key, response)
                {
                    warn!(error = %e, "Failed to store idempotent transfer cancellation");
                }
                info!(transfer_id = %transfer_id, "Transfer cancelled");
                self.emit(Event::TransferCancelled(transfer_id)).await;
            }
            Err(_) => {
                self.idempotency.abort("transfer-cancel", idempotency_key);
            }
        }
        result
    }

    /// Reads one transfer with its lines.
    #[instrument(skip(self))]
    pub async fn get_transfer(&self, transfer_id: Uuid) -> Result<TransferResponse, ServiceError> {
        let (transfer, lines) = self.load_transfer(transfer_id).await?;
        Ok(transfer_response(transfer, lines))
    }

    /// Stock currently in the pipe: shipped but not yet received.
    #[instrument(skip(self))]
    pub async fn in_transit(&self) -> Result<Vec<InTransitLine>, ServiceError> {
        let transfers = TransferEntity::find()
            .filter(transfer::Column::Status.eq(TransferStatus::InTransit.as_str()))
            .order_by_asc(transfer::Column::RequestedAt)
            .all(&*self.db_pool)
            .await?;

        let mut result = Vec::new();
        for transfer in transfers {
            let lines = TransferLineEntity::find()
                .filter(transfer_line::Column::TransferId.eq(transfer.id))
                .all(&*self.db_pool)
                .await?;
            for line in lines {
                result.push(InTransitLine {
                    transfer_id: transfer.id,
                    item_id: line.item_id,
                    from_location_id: transfer.from_location_id,
                    to_location_id: transfer.to_location_id,
                    quantity: line.quantity,
                    shipped_at: transfer.shipped_at,
                });
            }
        }
        Ok(result)
    }

    async fn load_transfer(
        &self,
        transfer_id: Uuid,
    ) -> Result<(transfer::Model, Vec<transfer_line::Model>), ServiceError> {
        let transfer = TransferEntity::find_by_id(transfer_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))?;
        let lines = TransferLineEntity::find()
            .filter(transfer_line::Column::TransferId.eq(transfer_id))
            .all(&*self.db_pool)
            .await?;
        Ok((transfer, lines))
    }
}
