use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::{ProductPatch, ProductRow};
use crate::{
    error::{AppError, AppResult},
    images::MultipartForm,
    state::AppState,
    users::wishlist,
};

/// Text fields of a new product; the picture is handled separately.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFields {
    pub title: String,
    pub description: String,
    pub category_id: Uuid,
    pub price: Decimal,
    pub discount: i32,
    pub stock: i32,
}

fn check_price(price: Decimal) -> AppResult<Decimal> {
    if price.is_sign_negative() {
        return Err(AppError::bad_request("Price cannot be negative"));
    }
    Ok(price.round_dp(2))
}

fn check_discount(discount: i32) -> AppResult<i32> {
    if !(0..=100).contains(&discount) {
        return Err(AppError::bad_request("Discount must be between 0 and 100"));
    }
    Ok(discount)
}

fn check_stock(stock: i32) -> AppResult<i32> {
    if stock < 0 {
        return Err(AppError::bad_request("Stock cannot be negative"));
    }
    Ok(stock)
}

pub fn parse_new(form: &MultipartForm) -> AppResult<ProductFields> {
    let (Some(title), Some(description), Some(_), Some(_)) = (
        form.text("title"),
        form.text("description"),
        form.text("category"),
        form.text("price"),
    ) else {
        return Err(AppError::bad_request("All fields are required"));
    };

    let category_id = form
        .parse::<Uuid>("category")?
        .ok_or_else(|| AppError::bad_request("All fields are required"))?;
    let price = form
        .parse::<Decimal>("price")?
        .ok_or_else(|| AppError::bad_request("All fields are required"))?;

    Ok(ProductFields {
        title: title.to_string(),
        description: description.to_string(),
        category_id,
        price: check_price(price)?,
        discount: check_discount(form.parse::<i32>("discount")?.unwrap_or(0))?,
        stock: check_stock(form.parse::<i32>("stock")?.unwrap_or(0))?,
    })
}

/// Fields present in the form become the patch; absent ones stay `None`.
pub fn parse_patch(form: &MultipartForm) -> AppResult<ProductPatch> {
    Ok(ProductPatch {
        title: form.text_owned("title"),
        description: form.text_owned("description"),
        category_id: form.parse::<Uuid>("category")?,
        price: form.parse::<Decimal>("price")?.map(check_price).transpose()?,
        discount: form.parse::<i32>("discount")?.map(check_discount).transpose()?,
        stock: form.parse::<i32>("stock")?.map(check_stock).transpose()?,
        picture_url: None,
        picture_public_id: None,
    })
}

/// Pushes a `priceAlert` to everyone who wishlisted the product and emails
/// them in the background. Only fires when the price went down.
pub async fn notify_price_drop(state: &AppState, before: &ProductRow, after: &ProductRow) {
    if after.price >= before.price {
        return;
    }

    let watchers = match wishlist::watchers(&state.db, after.id).await {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %format!("{e:#}"), product_id = %after.id, "price alert lookup failed");
            return;
        }
    };

    for watcher in &watchers {
        state
            .notifier
            .price_alert(watcher.user_id, after.id, &after.title, before.price, after.price);
    }
    info!(product_id = %after.id, watchers = watchers.len(), "price drop announced");

    let messenger = state.messenger.clone();
    let subject = format!("Price drop: {}", after.title);
    let body = format!(
        "Good news! {} on your wishlist dropped from {} to {}.",
        after.title, before.price, after.price
    );
    tokio::spawn(async move {
        for email in watchers.into_iter().filter_map(|w| w.email) {
            if let Err(e) = messenger.send_email(&email, &subject, &body).await {
                warn!(error = %format!("{e:#}"), to = %email, "price alert email failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm::from_parts(fields, vec![])
    }

    #[test]
    fn new_product_needs_core_fields() {
        let err = parse_new(&form(&[("title", "Kettle"), ("price", "10")])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn new_product_defaults_discount_and_stock() {
        let category = Uuid::new_v4().to_string();
        let fields = parse_new(&form(&[
            ("title", "Kettle"),
            ("description", "Steel, 1.7L"),
            ("category", &category),
            ("price", "2499.999"),
        ]))
        .unwrap();
        assert_eq!(fields.discount, 0);
        assert_eq!(fields.stock, 0);
        assert_eq!(fields.price, Decimal::new(250000, 2));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let category = Uuid::new_v4().to_string();
        let base = [
            ("title", "Kettle"),
            ("description", "Steel"),
            ("category", category.as_str()),
            ("price", "10"),
        ];

        let mut with_discount = base.to_vec();
        with_discount.push(("discount", "120"));
        assert!(parse_new(&form(&with_discount)).is_err());

        let mut with_stock = base.to_vec();
        with_stock.push(("stock", "-1"));
        assert!(parse_new(&form(&with_stock)).is_err());

        let mut bad_category = base.to_vec();
        bad_category[2] = ("category", "electronics");
        assert!(parse_new(&form(&bad_category)).is_err());
    }

    #[test]
    fn patch_only_carries_present_fields() {
        let patch = parse_patch(&form(&[("price", "99.5"), ("title", " ")])).unwrap();
        assert_eq!(
            patch,
            ProductPatch {
                price: Some(Decimal::new(995, 1)),
                ..ProductPatch::default()
            }
        );
        assert!(parse_patch(&form(&[("price", "-3")])).is_err());
    }
}
