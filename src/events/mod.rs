use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the redemption path for downstream consumers
/// (notifications, analytics, seller dashboards).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
    },
    RedemptionReleased {
        coupon_id: Uuid,
        order_id: Uuid,
        customer_id: Uuid,
    },
    CouponExhausted(Uuid),
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

/// Drains the event channel and logs each event. Spawned once at startup;
/// ends when every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CouponRedeemed {
                coupon_id,
                order_id,
                amount,
                ..
            } => {
                info!(%coupon_id, %order_id, %amount, "Coupon redeemed");
            }
            Event::RedemptionReleased {
                coupon_id,
                order_id,
                ..
            } => {
                info!(%coupon_id, %order_id, "Redemption released");
            }
            Event::CouponExhausted(coupon_id) => {
                warn!(%coupon_id, "Coupon reached its usage limit");
            }
        }
    }

    warn!("Event processing loop has ended");
}
