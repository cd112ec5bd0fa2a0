//! Retail POS API Library
//!
//! Core of a retail point-of-sale backend: an append-only stock ledger, a
//! derived inventory view with cart holds, an atomic transaction coordinator
//! for checkout/refund/void/adjust/receive, and an inter-location transfer
//! protocol.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod idempotency;
pub mod locks;
pub mod metrics;
pub mod migrator;
pub mod services;

use serde::Serialize;
use std::sync::Arc;

use crate::db::DbPool;
use crate::locks::LockRegistry;
use crate::services::coordinator::TransactionCoordinator;
use crate::services::inventory::InventoryService;
use crate::services::ledger::StockLedger;
use crate::services::pricing::{CatalogPricing, PricingResolver};

pub use handlers::api_v1_routes;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub coordinator: TransactionCoordinator,
    pub inventory: InventoryService,
    pub ledger: StockLedger,
}

impl AppState {
    /// Wires the services over one shared lock registry so the coordinator,
    /// the reservation sweep, and explicit holds serialize on the same
    /// (item, location) keys.
    pub fn build(
        db: Arc<DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let locks = LockRegistry::new();
        let pricing: Arc<dyn PricingResolver> = Arc::new(CatalogPricing::new(db.clone()));

        let coordinator = TransactionCoordinator::new(
            db.clone(),
            locks.clone(),
            event_sender.clone(),
            pricing,
            &config,
        );
        let inventory = InventoryService::new(
            db.clone(),
            locks,
            std::time::Duration::from_secs(config.reservation_ttl_secs),
        );
        let ledger = StockLedger::new(db.clone());

        Self {
            db,
            config,
            event_sender,
            coordinator,
            inventory,
            ledger,
        }
    }
}

// Common response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_wraps_data() {
        let response = ApiResponse::success(5);
        assert!(response.success);
        assert_eq!(response.data, Some(5));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 5);
        assert!(json.get("message").is_none());
    }
}
