use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::products::ProductView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCartRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CartLine {
    pub product: ProductView,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub total_quantity: i64,
}

impl CartView {
    pub fn new(user_id: Uuid, items: Vec<CartLine>) -> Self {
        let total_quantity = items.iter().map(|l| i64::from(l.quantity)).sum();
        Self {
            user_id,
            items,
            total_quantity,
        }
    }
}
