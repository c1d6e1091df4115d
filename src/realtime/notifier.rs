use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

pub const ADMIN_ROOM: &str = "admin";
pub const LOW_STOCK_THRESHOLD: i32 = 3;

/// One server-to-client message addressed to a room.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(skip)]
    pub room: String,
    pub event: &'static str,
    pub data: serde_json::Value,
}

/// Fans events out to every connected socket; each socket filters by the
/// rooms it joined.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Arc<Event>>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tx.subscribe()
    }

    /// Returns how many sockets were listening. Zero is not an error.
    pub fn emit(&self, room: impl Into<String>, event: &'static str, data: serde_json::Value) -> usize {
        let event = Event {
            room: room.into(),
            event,
            data,
        };
        debug!(room = %event.room, event = event.event, "emit");
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// Tells admins a product is running out. Only fires at or below the
    /// threshold; returns whether it fired.
    pub fn low_stock(&self, product_id: Uuid, title: &str, stock: i32) -> bool {
        if stock > LOW_STOCK_THRESHOLD {
            return false;
        }
        self.emit(
            ADMIN_ROOM,
            "lowStock",
            json!({ "productId": product_id, "title": title, "stock": stock }),
        );
        true
    }

    pub fn price_alert(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        title: &str,
        old_price: Decimal,
        new_price: Decimal,
    ) {
        self.emit(
            user_id.to_string(),
            "priceAlert",
            json!({
                "productId": product_id,
                "title": title,
                "oldPrice": old_price,
                "newPrice": new_price,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn low_stock_only_at_or_below_threshold() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        let id = Uuid::new_v4();

        assert!(!notifier.low_stock(id, "Kettle", 4));
        assert!(notifier.low_stock(id, "Kettle", 3));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.room, ADMIN_ROOM);
        assert_eq!(ev.event, "lowStock");
        assert_eq!(ev.data["stock"], 3);
        assert_eq!(ev.data["title"], "Kettle");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn price_alert_targets_user_room() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        let user = Uuid::new_v4();
        notifier.price_alert(user, Uuid::new_v4(), "Lamp", Decimal::new(2500, 2), Decimal::new(1999, 2));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.room, user.to_string());
        assert_eq!(ev.event, "priceAlert");
        let new_price = ev.data["newPrice"].as_f64().expect("number");
        assert!((new_price - 19.99).abs() < 1e-9);
    }

    #[test]
    fn emitting_without_listeners_is_fine() {
        let notifier = Notifier::new(8);
        assert_eq!(notifier.emit(ADMIN_ROOM, "lowStock", json!({})), 0);
    }

    #[test]
    fn room_is_not_serialized() {
        let ev = Event {
            room: "admin".into(),
            event: "lowStock",
            data: json!({ "stock": 1 }),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert!(value.get("room").is_none());
        assert_eq!(value["event"], "lowStock");
    }
}
