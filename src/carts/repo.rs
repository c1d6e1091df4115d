use std::collections::HashMap;

use anyhow::Context;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::products::ProductRow;

#[derive(Debug, Clone, FromRow)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Creates the user's cart when it does not exist yet.
pub async fn ensure(db: &PgPool, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(db)
        .await
        .context("ensure cart")?;
    Ok(())
}

pub async fn items(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<CartItem>> {
    let rows = sqlx::query_as::<_, CartItem>(
        "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY added_at",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list cart items")?;
    Ok(rows)
}

/// Items paired with their products, in the order they were added.
pub async fn items_with_products(
    db: &PgPool,
    user_id: Uuid,
) -> anyhow::Result<Vec<(ProductRow, i32)>> {
    let items = items(db, user_id).await?;
    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let mut products: HashMap<Uuid, ProductRow> = ProductRow::find_many(db, &ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(items
        .into_iter()
        .filter_map(|item| products.remove(&item.product_id).map(|p| (p, item.quantity)))
        .collect())
}

/// Sets the line's quantity, inserting the line if the product is not in
/// the cart yet. One statement, so a product never appears twice.
pub async fn set_quantity(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> anyhow::Result<()> {
    ensure(db, user_id).await?;
    sqlx::query(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .execute(db)
    .await
    .context("upsert cart item")?;

    sqlx::query("UPDATE carts SET updated_at = now() WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .context("touch cart")?;
    Ok(())
}

pub async fn remove(db: &PgPool, user_id: Uuid, product_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await
        .context("remove cart item")?;
    Ok(())
}

/// Drops the cart and, through the cascade, its items.
pub async fn clear(db: &PgPool, user_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM carts WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .context("clear cart")?;
    Ok(())
}
