use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Domain events emitted after an atomic unit commits.
///
/// Events are advisory fan-out for downstream consumers (reporting, sync);
/// they never drive ledger writes — only the transaction coordinator appends
/// movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SaleOpened {
        sale_id: Uuid,
        location_id: Uuid,
    },
    SaleCompleted {
        sale_id: Uuid,
        location_id: Uuid,
        line_count: usize,
    },
    SaleVoided(Uuid),
    RefundCompleted {
        refund_id: Uuid,
        sale_id: Uuid,
    },
    StockAdjusted {
        item_id: Uuid,
        location_id: Uuid,
        quantity_delta: i64,
    },
    StockReceived {
        item_id: Uuid,
        location_id: Uuid,
        quantity: i64,
    },
    TransferRequested(Uuid),
    TransferShipped(Uuid),
    TransferReceived(Uuid),
    TransferCancelled(Uuid),
    ReservationsExpired {
        count: u64,
    },
    InventoryRebuilt {
        item_id: Uuid,
        location_id: Uuid,
        on_hand: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer draining the event channel.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        debug!(?event, "Processing event");
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender.send(Event::SaleVoided(Uuid::new_v4())).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::SaleVoided(_))));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::ReservationsExpired { count: 1 })
            .await
            .is_err());
    }
}
