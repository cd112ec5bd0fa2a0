//! Inventory view and reservation management.
//!
//! `inventory_levels` is a projection: `on_hand` moves only when the ledger
//! appends, `reserved` moves only through the reservation helpers here, and
//! the whole row can be rebuilt from the ledger at any time.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::inventory_level::{self, Entity as InventoryLevelEntity};
use crate::entities::inventory_reservation::{
    self, Entity as ReservationEntity, ReservationStatus,
};
use crate::entities::stock_movement::{self, Entity as StockMovementEntity};
use crate::errors::ServiceError;
use crate::locks::LockRegistry;
use crate::metrics::RESERVATIONS_EXPIRED;
use crate::services::ledger;

/// Point-in-time view of one (item, location) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
}

/// Summary of a reservation for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i64,
    pub status: String,
    pub reference_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_expired: bool,
}

impl From<inventory_reservation::Model> for ReservationSummary {
    fn from(model: inventory_reservation::Model) -> Self {
        let is_expired = model.expires_at < Utc::now();
        Self {
            id: model.id,
            item_id: model.item_id,
            location_id: model.location_id,
            quantity: model.quantity,
            status: model.status,
            reference_id: model.reference_id,
            expires_at: model.expires_at,
            created_at: model.created_at,
            is_expired,
        }
    }
}

/// Result of one expiry sweep pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResult {
    pub expired_count: u64,
    pub cleaned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReserveRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub reference_id: Option<Uuid>,
}

pub(crate) async fn get_or_create_level<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    location_id: Uuid,
) -> Result<inventory_level::Model, ServiceError> {
    let existing = InventoryLevelEntity::find()
        .filter(inventory_level::Column::ItemId.eq(item_id))
        .filter(inventory_level::Column::LocationId.eq(location_id))
        .one(conn)
        .await?;

    if let Some(level) = existing {
        return Ok(level);
    }

    let created = inventory_level::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item_id),
        location_id: Set(location_id),
        on_hand: Set(0),
        reserved: Set(0),
        updated_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(created)
}

/// Creates an ACTIVE reservation and bumps `reserved`; the caller must hold
/// the (item, location) lock and an open transaction.
pub(crate) async fn reserve_in<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    location_id: Uuid,
    quantity: i64,
    reference_id: Option<Uuid>,
    ttl: Duration,
) -> Result<inventory_reservation::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "reservation quantity must be positive".to_string(),
        ));
    }
    ledger::ensure_item(conn, item_id).await?;
    ledger::ensure_location(conn, location_id).await?;

    let level = get_or_create_level(conn, item_id, location_id).await?;
    if level.available() < quantity {
        return Err(ServiceError::InsufficientStock(format!(
            "item {} at location {}: requested {}, available {}",
            item_id,
            location_id,
            quantity,
            level.available()
        )));
    }

    let now = Utc::now();
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| ServiceError::InternalError(format!("reservation ttl out of range: {}", e)))?;

    let new_reserved = level.reserved + quantity;
    let mut level_active: inventory_level::ActiveModel = level.into();
    level_active.reserved = Set(new_reserved);
    level_active.updated_at = Set(now);
    level_active.update(conn).await?;

    let reservation = inventory_reservation::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item_id),
        location_id: Set(location_id),
        quantity: Set(quantity),
        status: Set(ReservationStatus::Active.as_str().to_string()),
        reference_id: Set(reference_id),
        expires_at: Set(now + ttl),
        created_at: Set(now),
        updated_at: Set(None),
    }
    .insert(conn)
    .await?;

    Ok(reservation)
}

/// Moves an ACTIVE reservation to a finished state and gives its quantity
/// back to `available` (by dropping it from `reserved`). Consumption pairs
/// with a ledger append in the same transaction, so available is unchanged
/// at the commit point.
pub(crate) async fn settle_reservation<C: ConnectionTrait>(
    conn: &C,
    reservation: &inventory_reservation::Model,
    outcome: ReservationStatus,
) -> Result<(), ServiceError> {
    debug_assert!(matches!(
        outcome,
        ReservationStatus::Consumed | ReservationStatus::Released | ReservationStatus::Expired
    ));

    let level = get_or_create_level(conn, reservation.item_id, reservation.location_id).await?;
    if level.reserved < reservation.quantity {
        return Err(ServiceError::InternalError(format!(
            "reserved counter underflow for item {} at location {}",
            reservation.item_id, reservation.location_id
        )));
    }

    let now = Utc::now();
    let new_reserved = level.reserved - reservation.quantity;
    let mut level_active: inventory_level::ActiveModel = level.into();
    level_active.reserved = Set(new_reserved);
    level_active.updated_at = Set(now);
    level_active.update(conn).await?;

    let mut active: inventory_reservation::ActiveModel = reservation.clone().into();
    active.status = Set(outcome.as_str().to_string());
    active.updated_at = Set(Some(now));
    active.update(conn).await?;

    Ok(())
}

pub(crate) async fn active_reservations_for_sale<C: ConnectionTrait>(
    conn: &C,
    sale_id: Uuid,
) -> Result<Vec<inventory_reservation::Model>, ServiceError> {
    Ok(ReservationEntity::find()
        .filter(inventory_reservation::Column::ReferenceId.eq(sale_id))
        .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active.as_str()))
        .all(conn)
        .await?)
}

/// Service for the derived inventory view and cart holds.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    locks: LockRegistry,
    reservation_ttl: Duration,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, locks: LockRegistry, reservation_ttl: Duration) -> Self {
        Self {
            db_pool,
            locks,
            reservation_ttl,
        }
    }

    /// Current snapshot; never blocks writers and may trail an in-flight
    /// mutation by one commit.
    #[instrument(skip(self))]
    pub async fn snapshot(
        &self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<LevelSnapshot, ServiceError> {
        let db = &*self.db_pool;
        ledger::ensure_item(db, item_id).await?;
        ledger::ensure_location(db, location_id).await?;

        let level = InventoryLevelEntity::find()
            .filter(inventory_level::Column::ItemId.eq(item_id))
            .filter(inventory_level::Column::LocationId.eq(location_id))
            .one(db)
            .await?;

        Ok(match level {
            Some(level) => LevelSnapshot {
                item_id,
                location_id,
                on_hand: level.on_hand,
                reserved: level.reserved,
                available: level.available(),
            },
            None => LevelSnapshot {
                item_id,
                location_id,
                on_hand: 0,
                reserved: 0,
                available: 0,
            },
        })
    }

    /// Quantity that can be newly committed.
    pub async fn available(&self, item_id: Uuid, location_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self.snapshot(item_id, location_id).await?.available)
    }

    /// Places a cart hold.
    #[instrument(skip(self))]
    pub async fn reserve(&self, req: ReserveRequest) -> Result<ReservationSummary, ServiceError> {
        req.validate()?;

        let _guard = self.locks.acquire(req.item_id, req.location_id).await;
        let txn = self.db_pool.begin().await?;
        let reservation = reserve_in(
            &txn,
            req.item_id,
            req.location_id,
            req.quantity,
            req.reference_id,
            self.reservation_ttl,
        )
        .await?;
        txn.commit().await?;

        info!(
            reservation_id = %reservation.id,
            item_id = %req.item_id,
            location_id = %req.location_id,
            quantity = req.quantity,
            "Reserved stock"
        );
        Ok(ReservationSummary::from(reservation))
    }

    /// Releases a hold without any ledger movement.
    #[instrument(skip(self))]
    pub async fn release(&self, reservation_id: Uuid) -> Result<ReservationSummary, ServiceError> {
        let existing = ReservationEntity::find_by_id(reservation_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;

        let _guard = self
            .locks
            .acquire(existing.item_id, existing.location_id)
            .await;
        let txn = self.db_pool.begin().await?;

        let reservation = ReservationEntity::find_by_id(reservation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;

        if ReservationStatus::from_str(&reservation.status) != Some(ReservationStatus::Active) {
            return Err(ServiceError::ValidationError(format!(
                "Reservation {} is not active",
                reservation_id
            )));
        }

        settle_reservation(&txn, &reservation, ReservationStatus::Released).await?;
        txn.commit().await?;

        info!(reservation_id = %reservation_id, "Released reservation");

        let mut summary = ReservationSummary::from(reservation);
        summary.status = ReservationStatus::Released.as_str().to_string();
        Ok(summary)
    }

    /// Reclaims reservations whose timeout has strictly elapsed.
    ///
    /// Runs on a fixed interval in the background and is safe against live
    /// traffic: each candidate is re-checked under its own (item, location)
    /// lock before being expired.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<CleanupResult, ServiceError> {
        let now = Utc::now();

        let candidates = ReservationEntity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active.as_str()))
            .filter(inventory_reservation::Column::ExpiresAt.lt(now))
            .all(&*self.db_pool)
            .await?;

        let mut expired_count = 0u64;
        for candidate in candidates {
            let _guard = self
                .locks
                .acquire(candidate.item_id, candidate.location_id)
                .await;
            let txn = self.db_pool.begin().await?;

            let Some(current) = ReservationEntity::find_by_id(candidate.id).one(&txn).await? else {
                continue;
            };
            // Re-check under the lock: checkout may have consumed it since.
            if ReservationStatus::from_str(&current.status) != Some(ReservationStatus::Active)
                || current.expires_at >= now
            {
                continue;
            }

            match settle_reservation(&txn, &current, ReservationStatus::Expired).await {
                Ok(()) => {
                    txn.commit().await?;
                    expired_count += 1;
                    RESERVATIONS_EXPIRED.inc();
                    info!(
                        reservation_id = %current.id,
                        item_id = %current.item_id,
                        "Expired reservation reclaimed"
                    );
                }
                Err(e) => {
                    warn!(
                        reservation_id = %current.id,
                        error = %e,
                        "Failed to expire reservation"
                    );
                }
            }
        }

        Ok(CleanupResult {
            expired_count,
            cleaned_at: now,
        })
    }

    /// Invalidate-and-rebuild of one projection row from the ledger.
    ///
    /// `on_hand` comes from folding the movement log, `reserved` from the
    /// live ACTIVE reservations; incremental updates are never trusted when
    /// drift is suspected.
    #[instrument(skip(self))]
    pub async fn rebuild_level(
        &self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<LevelSnapshot, ServiceError> {
        let _guard = self.locks.acquire(item_id, location_id).await;
        let txn = self.db_pool.begin().await?;

        ledger::ensure_item(&txn, item_id).await?;
        ledger::ensure_location(&txn, location_id).await?;

        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::ItemId.eq(item_id))
            .filter(stock_movement::Column::LocationId.eq(location_id))
            .all(&txn)
            .await?;
        let on_hand: i64 = movements.iter().map(|m| m.quantity_delta).sum();

        let reservations = ReservationEntity::find()
            .filter(inventory_reservation::Column::ItemId.eq(item_id))
            .filter(inventory_reservation::Column::LocationId.eq(location_id))
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Active.as_str()))
            .all(&txn)
            .await?;
        let reserved: i64 = reservations.iter().map(|r| r.quantity).sum();

        let level = get_or_create_level(&txn, item_id, location_id).await?;
        let mut level_active: inventory_level::ActiveModel = level.into();
        level_active.on_hand = Set(on_hand);
        level_active.reserved = Set(reserved);
        level_active.updated_at = Set(Utc::now());
        level_active.update(&txn).await?;

        txn.commit().await?;

        info!(
            item_id = %item_id,
            location_id = %location_id,
            on_hand = on_hand,
            reserved = reserved,
            "Rebuilt inventory level from ledger"
        );

        Ok(LevelSnapshot {
            item_id,
            location_id,
            on_hand,
            reserved,
            available: on_hand - reserved,
        })
    }
}
