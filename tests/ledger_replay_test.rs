mod common;

use proptest::prelude::*;
use rust_decimal_macros::dec;

use retail_pos_api::errors::ServiceError;
use retail_pos_api::services::coordinator::{
    AdjustmentRequest, CheckoutRequest, RefundLineRequest, RefundRequest, SaleDraft, SaleLineDraft,
};

use common::TestApp;

/// Replayed on-hand must equal the projection after every operation.
#[tokio::test]
async fn replay_matches_projection_through_a_sale_lifecycle() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(10.00)).await;

    let assert_no_drift = |expected: i64| {
        let app = &app;
        async move {
            let replayed = app
                .state
                .ledger
                .replay(item, location, None)
                .await
                .expect("replay");
            let snapshot = app
                .state
                .inventory
                .snapshot(item, location)
                .await
                .expect("snapshot");
            assert_eq!(replayed, expected, "replay drifted from expectation");
            assert_eq!(snapshot.on_hand, expected, "projection drifted");
            assert!(snapshot.available >= 0);
            assert!(snapshot.available <= snapshot.on_hand);
        }
    };

    app.seed_stock(item, location, 10).await;
    assert_no_drift(10).await;

    let sale = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: None,
                draft: Some(SaleDraft {
                    location_id: location,
                    lines: vec![SaleLineDraft {
                        item_id: item,
                        quantity: 4,
                    }],
                    note: None,
                    actor_id: None,
                }),
            },
            "replay-checkout",
        )
        .await
        .expect("checkout");
    assert_no_drift(6).await;

    app.state
        .coordinator
        .refund(
            sale.id,
            RefundRequest {
                lines: vec![RefundLineRequest {
                    sale_line_id: sale.lines[0].id,
                    quantity: 1,
                }],
                actor_id: None,
            },
            "replay-refund",
        )
        .await
        .expect("refund");
    assert_no_drift(7).await;

    app.state
        .coordinator
        .adjust(
            AdjustmentRequest {
                item_id: item,
                location_id: location,
                quantity_delta: -2,
                note: Some("damaged".to_string()),
                actor_id: None,
            },
            "replay-adjust",
        )
        .await
        .expect("adjust");
    assert_no_drift(5).await;

    // History is strictly ordered by the per-pair sequence.
    let history = app
        .state
        .ledger
        .history(item, location, None, None)
        .await
        .unwrap();
    let sequences: Vec<i64> = history.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn rebuild_restores_a_drifted_projection() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(2.00)).await;
    app.seed_stock(item, location, 8).await;

    let rebuilt = app
        .state
        .inventory
        .rebuild_level(item, location)
        .await
        .expect("rebuild");
    assert_eq!(rebuilt.on_hand, 8);
    assert_eq!(rebuilt.reserved, 0);
    assert_eq!(rebuilt.available, 8);

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, rebuilt.on_hand);
}

#[tokio::test]
async fn zero_delta_adjustments_are_rejected() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(2.00)).await;

    let result = app
        .state
        .coordinator
        .adjust(
            AdjustmentRequest {
                item_id: item,
                location_id: location,
                quantity_delta: 0,
                note: None,
                actor_id: None,
            },
            "zero-adjust",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidQuantity)));
    assert_eq!(app.movement_count(item, location).await, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Any sequence of accepted adjustments folds to the same on-hand via
    /// replay and via the incrementally maintained projection.
    #[test]
    fn random_adjustments_never_drift(deltas in proptest::collection::vec(-5i64..=8, 1..12)) {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        rt.block_on(async {
            let app = TestApp::new().await;
            let location = app.seed_location("S1").await;
            let item = app.seed_item("SKU-P", dec!(1.00)).await;

            let mut expected = 0i64;
            for (i, raw) in deltas.iter().enumerate() {
                let delta = if *raw == 0 { 1 } else { *raw };
                let result = app
                    .state
                    .coordinator
                    .adjust(
                        AdjustmentRequest {
                            item_id: item,
                            location_id: location,
                            quantity_delta: delta,
                            note: None,
                            actor_id: None,
                        },
                        &format!("prop-adjust-{}", i),
                    )
                    .await;
                match result {
                    Ok(_) => expected += delta,
                    // Over-decrements are refused whole; the ledger is untouched.
                    Err(ServiceError::InsufficientStock(_)) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }

            let replayed = app.state.ledger.replay(item, location, None).await.unwrap();
            let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
            assert_eq!(replayed, expected);
            assert_eq!(snapshot.on_hand, expected);
            assert!(snapshot.available >= 0);
        });
    }
}
