#![allow(dead_code)]

use std::sync::Arc;

use axum::{routing::get, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use retail_pos_api::{
    config::AppConfig,
    db,
    entities::{item, location},
    events::{self, EventSender},
    services::coordinator::ReceiptRequest,
    AppState,
};

/// Test harness: application state over a fresh in-memory SQLite database.
///
/// A single pooled connection keeps the in-memory database alive and shared
/// for the lifetime of the harness.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Harness with a short reservation timeout, for expiry tests.
    pub async fn with_reservation_ttl(secs: u64) -> Self {
        Self::with_config(|cfg| cfg.reservation_ttl_secs = secs).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::build(Arc::new(pool), cfg, event_sender);

        Self {
            state,
            _event_task: event_task,
        }
    }

    /// Router mirroring the server wiring, for HTTP-level tests.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(retail_pos_api::handlers::health::health))
            .nest("/api/v1", retail_pos_api::api_v1_routes())
            .with_state(self.state.clone())
    }

    pub async fn seed_location(&self, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        location::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(format!("Location {}", code)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed location");
        id
    }

    pub async fn seed_item(&self, sku: &str, list_price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        item::ActiveModel {
            id: Set(id),
            sku: Set(sku.to_string()),
            name: Set(format!("Item {}", sku)),
            list_price: Set(list_price),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed item");
        id
    }

    /// Puts stock on hand through a purchase receipt, the way stock enters
    /// the system in production.
    pub async fn seed_stock(&self, item_id: Uuid, location_id: Uuid, quantity: i64) {
        self.state
            .coordinator
            .receive(
                ReceiptRequest {
                    item_id,
                    location_id,
                    quantity,
                    reference_id: None,
                    note: Some("test seed".to_string()),
                    actor_id: None,
                },
                &format!("seed-{}", Uuid::new_v4()),
            )
            .await
            .expect("failed to seed stock");
    }

    pub async fn movement_count(&self, item_id: Uuid, location_id: Uuid) -> usize {
        self.state
            .ledger
            .history(item_id, location_id, None, None)
            .await
            .expect("failed to read history")
            .len()
    }
}
