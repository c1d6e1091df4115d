use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::repo_types::{Order, OrderItem, PaymentStatus, ShipmentAddress};

/// Cash-on-delivery checkout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub cart_items: Vec<OrderItem>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipment_address: Option<ShipmentAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStripeOrderRequest {
    pub stripe_session_id: Option<String>,
    #[serde(default)]
    pub cart_items: Vec<OrderItem>,
    pub total_amount: Option<Decimal>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipment_address: Option<ShipmentAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStripeOrderRequest {
    pub stripe_session_id: Option<String>,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub total: usize,
}
