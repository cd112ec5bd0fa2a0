mod common;

use rust_decimal_macros::dec;
use uuid::Uuid;

use retail_pos_api::entities::sale::SaleStatus;
use retail_pos_api::errors::ServiceError;
use retail_pos_api::services::coordinator::{
    CheckoutRequest, RefundLineRequest, RefundRequest, SaleDraft, SaleLineDraft,
};

use common::TestApp;

fn draft(location_id: Uuid, item_id: Uuid, quantity: i64) -> SaleDraft {
    SaleDraft {
        location_id,
        lines: vec![SaleLineDraft { item_id, quantity }],
        note: None,
        actor_id: None,
    }
}

#[tokio::test]
async fn cart_checkout_decrements_on_hand_at_commit() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(10.00)).await;
    app.seed_stock(item, location, 5).await;

    // Opening the cart reserves: available drops, on_hand does not.
    let sale = app
        .state
        .coordinator
        .create_sale(draft(location, item, 3))
        .await
        .expect("create sale");
    assert_eq!(sale.status, SaleStatus::Open.as_str());

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 5);
    assert_eq!(snapshot.reserved, 3);
    assert_eq!(snapshot.available, 2);

    // Checkout commits: the reservation converts into a SALE movement.
    let completed = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: Some(sale.id),
                draft: None,
            },
            "checkout-1",
        )
        .await
        .expect("checkout");
    assert_eq!(completed.status, SaleStatus::Completed.as_str());
    assert!(completed.completed_at.is_some());

    // Price from the catalog, 5% tax on the net.
    assert_eq!(completed.subtotal, dec!(30.00));
    assert_eq!(completed.tax_total, dec!(1.50));
    assert_eq!(completed.total, dec!(31.50));

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 2);
    assert_eq!(snapshot.reserved, 0);
    assert_eq!(snapshot.available, 2);
}

#[tokio::test]
async fn checkout_beyond_available_fails_without_movements() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(4.25)).await;
    app.seed_stock(item, location, 5).await;

    let result = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: None,
                draft: Some(draft(location, item, 6)),
            },
            "checkout-over",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));

    // Nothing was appended beyond the seed receipt; available is untouched.
    assert_eq!(app.movement_count(item, location).await, 1);
    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.available, 5);
    assert_eq!(snapshot.on_hand, 5);
}

#[tokio::test]
async fn refunds_accumulate_until_fully_refunded() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(10.00)).await;
    app.seed_stock(item, location, 5).await;

    let sale = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: None,
                draft: Some(draft(location, item, 3)),
            },
            "checkout-refund",
        )
        .await
        .expect("checkout");
    let line_id = sale.lines[0].id;

    // Refund 2 of 3: partial.
    let refund = app
        .state
        .coordinator
        .refund(
            sale.id,
            RefundRequest {
                lines: vec![RefundLineRequest {
                    sale_line_id: line_id,
                    quantity: 2,
                }],
                actor_id: None,
            },
            "refund-1",
        )
        .await
        .expect("refund");
    assert_eq!(refund.sale_status, SaleStatus::PartiallyRefunded.as_str());
    assert_eq!(refund.total, dec!(20.00));

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 4);

    // Only 1 unit remains refundable.
    let over = app
        .state
        .coordinator
        .refund(
            sale.id,
            RefundRequest {
                lines: vec![RefundLineRequest {
                    sale_line_id: line_id,
                    quantity: 2,
                }],
                actor_id: None,
            },
            "refund-2",
        )
        .await;
    assert!(matches!(over, Err(ServiceError::OverRefund(_))));

    let refund = app
        .state
        .coordinator
        .refund(
            sale.id,
            RefundRequest {
                lines: vec![RefundLineRequest {
                    sale_line_id: line_id,
                    quantity: 1,
                }],
                actor_id: None,
            },
            "refund-3",
        )
        .await
        .expect("final refund");
    assert_eq!(refund.sale_status, SaleStatus::Refunded.as_str());

    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.on_hand, 5);

    // A fully refunded sale accepts no further refunds.
    let exhausted = app
        .state
        .coordinator
        .refund(
            sale.id,
            RefundRequest {
                lines: vec![RefundLineRequest {
                    sale_line_id: line_id,
                    quantity: 1,
                }],
                actor_id: None,
            },
            "refund-4",
        )
        .await;
    assert!(matches!(exhausted, Err(ServiceError::SaleNotCompleted(_))));
}

#[tokio::test]
async fn void_releases_holds_without_movements() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(2.50)).await;
    app.seed_stock(item, location, 5).await;

    let sale = app
        .state
        .coordinator
        .create_sale(draft(location, item, 4))
        .await
        .expect("create sale");
    assert_eq!(
        app.state.inventory.available(item, location).await.unwrap(),
        1
    );

    let voided = app
        .state
        .coordinator
        .void(sale.id, "void-1")
        .await
        .expect("void");
    assert_eq!(voided.status, SaleStatus::Voided.as_str());

    // Holds are gone, and the ledger never saw the sale.
    let snapshot = app.state.inventory.snapshot(item, location).await.unwrap();
    assert_eq!(snapshot.available, 5);
    assert_eq!(snapshot.reserved, 0);
    assert_eq!(app.movement_count(item, location).await, 1);

    // Void is only reachable from OPEN.
    let again = app.state.coordinator.void(sale.id, "void-2").await;
    assert!(matches!(again, Err(ServiceError::SaleNotOpen(_))));

    // A voided sale cannot be checked out.
    let checkout = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: Some(sale.id),
                draft: None,
            },
            "checkout-voided",
        )
        .await;
    assert!(matches!(checkout, Err(ServiceError::SaleNotOpen(_))));
}

#[tokio::test]
async fn refund_requires_a_completed_sale() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(1.00)).await;
    app.seed_stock(item, location, 5).await;

    let sale = app
        .state
        .coordinator
        .create_sale(draft(location, item, 1))
        .await
        .expect("create sale");

    let result = app
        .state
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
            "refund-open",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::SaleNotCompleted(_))));
}

#[tokio::test]
async fn unknown_references_are_rejected() {
    let app = TestApp::new().await;
    let location = app.seed_location("S1").await;
    let item = app.seed_item("SKU-1", dec!(1.00)).await;
    app.seed_stock(item, location, 5).await;

    let ghost_item = Uuid::new_v4();
    let result = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: None,
                draft: Some(draft(location, ghost_item, 1)),
            },
            "checkout-ghost-item",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::UnknownItem(_))));

    let ghost_location = Uuid::new_v4();
    let result = app
        .state
        .coordinator
        .checkout(
            CheckoutRequest {
                sale_id: None,
                draft: Some(draft(ghost_location, item, 1)),
            },
            "checkout-ghost-location",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::UnknownLocation(_))));
}
