mod common;

use rust_decimal_macros::dec;

use retail_pos_api::services::coordinator::{
    CheckoutRequest, ReceiptRequest, SaleDraft, SaleLineDraft,
};

use common::TestApp;

#[tokio::test]
async fn checkout_replay_returns_original_sale_without_side_effects() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(10.00)).await;
    app.seed_stock(item, location, 5).await;

    let request = CheckoutRequest {
        sale_id: None,
        draft: Some(SaleDraft {
            location_id: location,
            lines: vec![SaleLineDraft {
                item_id: item,
                quantity: 3,
            }],
            note: None,
            actor_id: None,
        }),
    };

    let first = app
        .state
        .coordinator
        .checkout(request.clone(), "idem-1")
        .await
        .expect("first checkout");
    let movements_after_first = app.movement_count(item, location).await;

    // Replaying the same key returns the identical sale and appends nothing,
    // even though the draft would otherwise sell more stock.
    let replay = app
        .state
        .coordinator
        .checkout(request, "idem-1")
        .await
        .expect("replayed checkout");

    assert_eq!(replay.id, first.id);
    assert_eq!(replay.total, first.total);
    assert_eq!(replay.lines.len(), first.lines.len());
    assert_eq!(
        app.movement_count(item, location).await,
        movements_after_first
    );

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 2);
}

#[tokio::test]
async fn failed_attempts_do_not_poison_the_key() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(10.00)).await;
    app.seed_stock(item, location, 2).await;

    let over = CheckoutRequest {
        sale_id: None,
        draft: Some(SaleDraft {
            location_id: location,
            lines: vec![SaleLineDraft {
                item_id: item,
                quantity: 5,
            }],
            note: None,
            actor_id: None,
        }),
    };
    assert!(app
        .state
        .coordinator
        .checkout(over, "idem-retry")
        .await
        .is_err());

    // After restock the same key can be retried and succeed.
    app.seed_stock(item, location, 5).await;
    let retried = CheckoutRequest {
        sale_id: None,
        draft: Some(SaleDraft {
            location_id: location,
            lines: vec![SaleLineDraft {
                item_id: item,
                quantity: 5,
            }],
            note: None,
            actor_id: None,
        }),
    };
    assert!(app
        .state
        .coordinator
        .checkout(retried, "idem-retry")
        .await
        .is_ok());
}

#[tokio::test]
async fn receipt_replay_appends_exactly_one_movement() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(3.00)).await;

    let req = ReceiptRequest {
        item_id: item,
        location_id: location,
        quantity: 7,
        reference_id: None,
        note: None,
        actor_id: None,
    };

    let first = app
        .state
        .coordinator
        .receive(req.clone(), "po-receipt-1")
        .await
        .expect("first receipt");
    let replay = app
        .state
        .coordinator
        .receive(req.clone(), "po-receipt-1")
        .await
        .expect("replayed receipt");
    assert_eq!(first.movement_id, replay.movement_id);
    assert_eq!(app.movement_count(item, location).await, 1);

    // A different key is a different receipt.
    app.state
        .coordinator
        .receive(req, "po-receipt-2")
        .await
        .expect("second receipt");
    assert_eq!(app.movement_count(item, location).await, 2);
    assert_eq!(
        app.state.inventory.available(item, location).await.unwrap(),
        14
    );
}
