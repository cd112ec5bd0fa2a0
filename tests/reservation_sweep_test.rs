mod common;

use std::time::Duration;

use rust_decimal_macros::dec;

use retail_pos_api::entities::sale::SaleStatus;
use retail_pos_api::services::coordinator::{CheckoutRequest, SaleDraft, SaleLineDraft};
use retail_pos_api::services::inventory::ReserveRequest;

use common::TestApp;

#[tokio::test]
async fn sweep_reclaims_only_strictly_elapsed_holds() {
    let app = TestApp::with_reservation_ttl(1).await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(1.00)).await;
    app.seed_stock(item, location, 10).await;

    let stale = app
        .state
        .inventory
        .reserve(ReserveRequest {
            item_id: item,
            location_id: location,
            quantity: 4,
            reference_id: None,
        })
        .await
        .expect("first hold");

    // Let the first hold expire, then place a fresh one.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let fresh = app
        .state
        .inventory
        .reserve(ReserveRequest {
            item_id: item,
            location_id: location,
            quantity: 2,
            reference_id: None,
        })
        .await
        .expect("second hold");

    let result = app.state.inventory.sweep_expired().await.expect("sweep");
    assert_eq!(result.expired_count, 1);

    // The stale hold's stock is available again; the fresh one still counts.
    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.reserved, 2);
    assert_eq!(snapshot.available, 8);

    // Sweeping again finds nothing new.
    let again = app.state.inventory.sweep_expired().await.expect("sweep");
    assert_eq!(again.expired_count, 0);

    // The reclaimed hold can no longer be released.
    assert!(app.state.inventory.release(stale.id).await.is_err());
    assert!(app.state.inventory.release(fresh.id).await.is_ok());
}

#[tokio::test]
async fn checkout_survives_an_expired_unswept_hold() {
    let app = TestApp::with_reservation_ttl(1).await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(3.00)).await;
    app.seed_stock(item, location, 5).await;

    let sale = app
        .state
        .coordinator
        .create_sale(SaleDraft {
            location_id: location,
            lines: vec![SaleLineDraft {
                item_id: item,
                quantity: 3,
            }],
            note: None,
            actor_id: None,
        })
        .await
        .expect("create sale");

    // The cart outlives its hold, but checkout still completes: the hold is
    // consumed if present, re-checked against availability if already swept.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let completed = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: Some(sale.id),
                draft: None,
            },
            "late-checkout",
        )
        .await
        .expect("late checkout");
    assert_eq!(completed.status, SaleStatus::Completed.as_str());

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 2);
    assert_eq!(snapshot.reserved, 0);
}

#[tokio::test]
async fn checkout_after_sweep_rechecks_availability() {
    let app = TestApp::with_reservation_ttl(1).await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(3.00)).await;
    app.seed_stock(item, location, 5).await;

    let sale = app
        .state
        .coordinator
        .create_sale(SaleDraft {
            location_id: location,
            lines: vec![SaleLineDraft {
                item_id: item,
                quantity: 3,
            }],
            note: None,
            actor_id: None,
        })
        .await
        .expect("create sale");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let swept = app.state.inventory.sweep_expired().await.unwrap();
    assert_eq!(swept.expired_count, 1);
    assert_eq!(
        app.state.inventory.available(item, location).await.unwrap(),
        5
    );

    // The hold is gone but stock still suffices, so checkout re-reserves
    // implicitly and completes.
    let completed = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: Some(sale.id),
                draft: None,
            },
            "post-sweep-checkout",
        )
        .await
        .expect("checkout after sweep");
    assert_eq!(completed.status, SaleStatus::Completed.as_str());
    assert_eq!(
        app.state.inventory.available(item, location).await.unwrap(),
        2
    );
}
