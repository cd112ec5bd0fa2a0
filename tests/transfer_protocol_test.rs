mod common;

use rust_decimal_macros::dec;

use retail_pos_api::entities::transfer::TransferStatus;
use retail_pos_api::errors::ServiceError;
use retail_pos_api::services::transfers::{TransferDraft, TransferLineDraft};

use common::TestApp;

fn two_unit_draft(from: uuid::Uuid, to: uuid::Uuid, item: uuid::Uuid) -> TransferDraft {
    TransferDraft {
        from_location_id: from,
        to_location_id: to,
        lines: vec![TransferLineDraft {
            item_id: item,
            quantity: 2,
        }],
        note: None,
    }
}

#[tokio::test]
async fn received_transfer_conserves_stock() {
    let app = TestApp::new().await;
    let store = app.seed_location("S1").await;
    let warehouse = app.seed_location("W1").await;
    let item = app.seed_item("SKU-1", dec!(5.00)).await;
    app.seed_stock(item, warehouse, 10).await;

    let transfer = app
        .state
        .coordinator
        .request_transfer(two_unit_draft(warehouse, store, item), "tr-1")
        .await
        .expect("request");
    assert_eq!(transfer.status, TransferStatus::Requested.as_str());
    // A request alone moves nothing.
    assert_eq!(app.movement_count(item, warehouse).await, 1);
    assert_eq!(app.movement_count(item, store).await, 0);

    let shipped = app
        .state
        .coordinator
        .ship_transfer(transfer.id, None, "tr-1-ship")
        .await
        .expect("ship");
    assert_eq!(shipped.status, TransferStatus::InTransit.as_str());

    // In the pipe: source on-hand dropped, destination untouched.
    assert_eq!(
        app.state
            .inventory
            .available(item, warehouse)
            .await
            .unwrap(),
        8
    );
    assert_eq!(app.state.inventory.available(item, store).await.unwrap(), 0);
    let in_transit = app.state.coordinator.in_transit().await.unwrap();
    assert_eq!(in_transit.len(), 1);
    assert_eq!(in_transit[0].quantity, 2);
    assert_eq!(in_transit[0].transfer_id, transfer.id);

    let received = app
        .state
        .coordinator
        .receive_transfer(transfer.id, None, "tr-1-receive")
        .await
        .expect("receive");
    assert_eq!(received.status, TransferStatus::Received.as_str());

    assert_eq!(app.state.inventory.available(item, store).await.unwrap(), 2);
    assert!(app.state.coordinator.in_transit().await.unwrap().is_empty());

    // Conservation: the transfer's movements sum to zero across locations.
    let movements = app
        .state
        .ledger
        .movements_for_reference(transfer.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    let net: i64 = movements.iter().map(|m| m.quantity_delta).sum();
    assert_eq!(net, 0);
}

#[tokio::test]
async fn cancel_is_only_possible_before_shipment() {
    let app = TestApp::new().await;
    let store = app.seed_location("S1").await;
    let warehouse = app.seed_location("W1").await;
    let item = app.seed_item("SKU-1", dec!(5.00)).await;
    app.seed_stock(item, warehouse, 10).await;

    // Cancel from REQUESTED: fine, zero net movements.
    let transfer = app
        .state
        .coordinator
        .request_transfer(two_unit_draft(warehouse, store, item), "tr-c1")
        .await
        .unwrap();
    let cancelled = app
        .state
        .coordinator
        .cancel_transfer(transfer.id, "tr-c1-cancel")
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, TransferStatus::Cancelled.as_str());
    assert!(app
        .state
        .ledger
        .movements_for_reference(transfer.id)
        .await
        .unwrap()
        .is_empty());

    // A cancelled transfer cannot ship.
    let ship = app
        .state
        .coordinator
        .ship_transfer(transfer.id, None, "tr-c1-ship")
        .await;
    assert!(matches!(ship, Err(ServiceError::InvalidTransferState(_))));

    // Once shipped, cancellation is off the table.
    let transfer = app
        .state
        .coordinator
        .request_transfer(two_unit_draft(warehouse, store, item), "tr-c2")
        .await
        .unwrap();
    app.state
        .coordinator
        .ship_transfer(transfer.id, None, "tr-c2-ship")
        .await
        .unwrap();
    let cancel = app
        .state
        .coordinator
        .cancel_transfer(transfer.id, "tr-c2-cancel")
        .await;
    assert!(matches!(cancel, Err(ServiceError::InvalidTransferState(_))));

    // Receiving before shipping is equally illegal.
    let transfer = app
        .state
        .coordinator
        .request_transfer(two_unit_draft(warehouse, store, item), "tr-c3")
        .await
        .unwrap();
    let receive = app
        .state
        .coordinator
        .receive_transfer(transfer.id, None, "tr-c3-receive")
        .await;
    assert!(matches!(receive, Err(ServiceError::InvalidTransferState(_))));
}

#[tokio::test]
async fn shipping_more_than_available_fails_atomically() {
    let app = TestApp::new().await;
    let store = app.seed_location("S1").await;
    let warehouse = app.seed_location("W1").await;
    let cheap = app.seed_item("SKU-CHEAP", dec!(1.00)).await;
    let rare = app.seed_item("SKU-RARE", dec!(9.00)).await;
    app.seed_stock(cheap, warehouse, 10).await;
    app.seed_stock(rare, warehouse, 1).await;

    let transfer = app
        .state
        .coordinator
        .request_transfer(
            TransferDraft {
                from_location_id: warehouse,
                to_location_id: store,
                lines: vec![
                    TransferLineDraft {
                        item_id: cheap,
                        quantity: 5,
                    },
                    TransferLineDraft {
                        item_id: rare,
                        quantity: 3,
                    },
                ],
                note: None,
            },
            "tr-a1",
        )
        .await
        .unwrap();

    let ship = app
        .state
        .coordinator
        .ship_transfer(transfer.id, None, "tr-a1-ship")
        .await;
    assert!(matches!(ship, Err(ServiceError::InsufficientStock(_))));

    // The whole unit rolled back: the shippable line moved nothing either.
    assert_eq!(
        app.state
            .inventory
            .available(cheap, warehouse)
            .await
            .unwrap(),
        10
    );
    assert!(app
        .state
        .ledger
        .movements_for_reference(transfer.id)
        .await
        .unwrap()
        .is_empty());

    let current = app.state.coordinator.get_transfer(transfer.id).await.unwrap();
    assert_eq!(current.status, TransferStatus::Requested.as_str());
}
