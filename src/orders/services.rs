use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::{Order, OrderItem};
use crate::{
    error::{AppError, AppResult},
    products::ProductRow,
    state::AppState,
};

pub fn validate_items(items: &[OrderItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::bad_request("Invalid cart items"));
    }
    for item in items {
        if item.quantity < 1 {
            return Err(AppError::bad_request("Item quantity must be at least 1"));
        }
        if item.price.is_sign_negative() {
            return Err(AppError::bad_request("Item price cannot be negative"));
        }
    }
    Ok(())
}

pub fn items_total(items: &[OrderItem]) -> Decimal {
    items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum::<Decimal>()
        .round_dp(2)
}

/// Takes the order's items off stock exactly once per order and tells the
/// admin room about anything running low. Each decrement is its own atomic
/// statement; failures are logged and the rest still run.
pub async fn apply_stock_once(state: &AppState, order_id: Uuid) {
    let items = match Order::claim_stock(&state.db, order_id).await {
        Ok(Some(items)) => items,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %format!("{e:#}"), order_id = %order_id, "stock claim failed");
            return;
        }
    };

    for item in items {
        match ProductRow::decrement_stock(&state.db, item.product_id, item.quantity).await {
            Ok(Some((title, stock))) => {
                info!(product_id = %item.product_id, stock, "stock updated");
                state.notifier.low_stock(item.product_id, &title, stock);
            }
            Ok(None) => {
                warn!(product_id = %item.product_id, "ordered product no longer exists");
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), product_id = %item.product_id, "stock update failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: Decimal, quantity: i32) -> OrderItem {
        OrderItem {
            product_id: Uuid::new_v4(),
            title: "Mug".into(),
            quantity,
            price,
            picture_url: String::new(),
        }
    }

    #[test]
    fn totals_multiply_by_quantity() {
        let items = vec![item(Decimal::new(1999, 2), 2), item(Decimal::new(500, 2), 1)];
        assert_eq!(items_total(&items), Decimal::new(4498, 2));
        assert_eq!(items_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn empty_or_bad_items_are_rejected() {
        assert!(validate_items(&[]).is_err());
        assert!(validate_items(&[item(Decimal::ONE, 0)]).is_err());
        assert!(validate_items(&[item(Decimal::new(-1, 0), 1)]).is_err());
        assert!(validate_items(&[item(Decimal::ONE, 3)]).is_ok());
    }

    #[test]
    fn items_parse_from_storefront_json() {
        let raw = serde_json::json!([
            { "productId": Uuid::nil(), "title": "Mug", "price": 12.5, "pictureUrl": "u" }
        ]);
        let items: Vec<OrderItem> = serde_json::from_value(raw).unwrap();
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[0].price, Decimal::new(125, 1));
    }
}
