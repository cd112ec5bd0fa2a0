use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::item::Entity as ItemEntity;
use crate::errors::ServiceError;

/// Price and discount for one sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineQuote {
    pub unit_price: Decimal,
    pub discount: Decimal,
}

/// Collaborator supplying line prices and discounts.
///
/// The transaction coordinator consumes quotes but does not own pricing;
/// promotions and price lists live behind this seam.
#[async_trait]
pub trait PricingResolver: Send + Sync {
    async fn resolve(&self, item_id: Uuid, quantity: i64) -> Result<LineQuote, ServiceError>;
}

/// Default resolver: the item's catalog list price, no discount.
pub struct CatalogPricing {
    db_pool: Arc<DbPool>,
}

impl CatalogPricing {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PricingResolver for CatalogPricing {
    async fn resolve(&self, item_id: Uuid, _quantity: i64) -> Result<LineQuote, ServiceError> {
        let item = ItemEntity::find_by_id(item_id)
            .one(&*self.db_pool)
            .await?
            .ok_or(ServiceError::UnknownItem(item_id))?;

        Ok(LineQuote {
            unit_price: item.list_price,
            discount: Decimal::ZERO,
        })
    }
}
