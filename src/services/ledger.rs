use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::item::Entity as ItemEntity;
use crate::entities::location::Entity as LocationEntity;
use crate::entities::stock_movement::{self, Entity as StockMovementEntity, MovementReason};
use crate::entities::{inventory_level, stock_movement::Model as Movement};
use crate::errors::ServiceError;
use crate::metrics::MOVEMENTS_APPENDED;
use crate::services::inventory;

/// Input for one ledger append.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_delta: i64,
    pub reason: MovementReason,
    pub reference_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
}

pub(crate) async fn ensure_item<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<(), ServiceError> {
    ItemEntity::find_by_id(item_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(ServiceError::UnknownItem(item_id))
}

pub(crate) async fn ensure_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
) -> Result<(), ServiceError> {
    LocationEntity::find_by_id(location_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(ServiceError::UnknownLocation(location_id))
}

async fn next_sequence<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    location_id: Uuid,
) -> Result<i64, ServiceError> {
    let last = StockMovementEntity::find()
        .filter(stock_movement::Column::ItemId.eq(item_id))
        .filter(stock_movement::Column::LocationId.eq(location_id))
        .order_by_desc(stock_movement::Column::Sequence)
        .one(conn)
        .await?;
    Ok(last.map(|m| m.sequence + 1).unwrap_or(1))
}

/// Appends one movement and updates the projection in the same atomic unit.
///
/// Only the transaction coordinator calls this, always on an open
/// transaction and under the (item, location) lock; nothing else in the
/// crate writes `stock_movements` or `inventory_levels.on_hand`. The guard
/// `on_hand + delta >= reserved` keeps `available` non-negative, which also
/// keeps `on_hand` non-negative.
pub(crate) async fn append<C: ConnectionTrait>(
    conn: &C,
    movement: NewMovement,
) -> Result<Movement, ServiceError> {
    if movement.quantity_delta == 0 {
        return Err(ServiceError::InvalidQuantity);
    }
    ensure_item(conn, movement.item_id).await?;
    ensure_location(conn, movement.location_id).await?;

    let level = inventory::get_or_create_level(conn, movement.item_id, movement.location_id).await?;
    let new_on_hand = level.on_hand + movement.quantity_delta;
    if new_on_hand < level.reserved {
        return Err(ServiceError::InsufficientStock(format!(
            "item {} at location {}: delta {} but only {} available",
            movement.item_id,
            movement.location_id,
            movement.quantity_delta,
            level.available()
        )));
    }

    let sequence = next_sequence(conn, movement.item_id, movement.location_id).await?;
    let now = Utc::now();

    let saved = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(movement.item_id),
        location_id: Set(movement.location_id),
        quantity_delta: Set(movement.quantity_delta),
        reason: Set(movement.reason.as_str().to_string()),
        reference_id: Set(movement.reference_id),
        sequence: Set(sequence),
        occurred_at: Set(now),
        actor_id: Set(movement.actor_id),
        note: Set(movement.note),
    }
    .insert(conn)
    .await?;

    let mut level_active: inventory_level::ActiveModel = level.into();
    level_active.on_hand = Set(new_on_hand);
    level_active.updated_at = Set(now);
    level_active.update(conn).await?;

    MOVEMENTS_APPENDED
        .with_label_values(&[movement.reason.as_str()])
        .inc();

    Ok(saved)
}

/// Read side of the movement log: history and audit replay.
#[derive(Clone)]
pub struct StockLedger {
    db_pool: Arc<DbPool>,
}

impl StockLedger {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Ordered movement history for one (item, location), optionally bounded
    /// by occurrence time.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Movement>, ServiceError> {
        let mut query = StockMovementEntity::find()
            .filter(stock_movement::Column::ItemId.eq(item_id))
            .filter(stock_movement::Column::LocationId.eq(location_id));

        if let Some(from) = from {
            query = query.filter(stock_movement::Column::OccurredAt.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(stock_movement::Column::OccurredAt.lte(to));
        }

        Ok(query
            .order_by_asc(stock_movement::Column::Sequence)
            .all(&*self.db_pool)
            .await?)
    }

    /// Recomputes on-hand by folding all movements up to a point in time.
    ///
    /// Used for audit and for rebuilding the projection; the result must
    /// always match `InventoryLevel::on_hand` when `as_of` is `None`.
    #[instrument(skip(self))]
    pub async fn replay(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<i64, ServiceError> {
        let movements = self.history(item_id, location_id, None, as_of).await?;
        Ok(movements.iter().map(|m| m.quantity_delta).sum())
    }

    /// All movements carrying one reference id (a sale, refund, or transfer),
    /// in occurrence order. Used for reconciliation.
    #[instrument(skip(self))]
    pub async fn movements_for_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<Movement>, ServiceError> {
        Ok(StockMovementEntity::find()
            .filter(stock_movement::Column::ReferenceId.eq(reference_id))
            .order_by_asc(stock_movement::Column::OccurredAt)
            .all(&*self.db_pool)
            .await?)
    }
}
