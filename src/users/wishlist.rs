//! Products a user is watching. Price drops on these trigger alerts.

use anyhow::Context;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::products::{repo::PRODUCT_SELECT, ProductRow};

/// Someone to tell when a wishlisted product gets cheaper.
#[derive(Debug, Clone, FromRow)]
pub struct Watcher {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Adding twice is a no-op.
pub async fn add(db: &PgPool, user_id: Uuid, product_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wishlist_items (user_id, product_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, product_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .execute(db)
    .await
    .context("add wishlist item")?;
    Ok(())
}

pub async fn remove(db: &PgPool, user_id: Uuid, product_id: Uuid) -> anyhow::Result<bool> {
    let removed = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await
        .context("remove wishlist item")?
        .rows_affected();
    Ok(removed > 0)
}

pub async fn products(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ProductRow>> {
    let sql = format!(
        "{PRODUCT_SELECT} JOIN wishlist_items w ON w.product_id = p.id \
         WHERE w.user_id = $1 ORDER BY w.created_at DESC"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
        .context("list wishlist")?;
    Ok(rows)
}

pub async fn watchers(db: &PgPool, product_id: Uuid) -> anyhow::Result<Vec<Watcher>> {
    let rows = sqlx::query_as::<_, Watcher>(
        r#"
        SELECT w.user_id, u.email
          FROM wishlist_items w
          JOIN users u ON u.id = w.user_id
         WHERE w.product_id = $1
        "#,
    )
    .bind(product_id)
    .fetch_all(db)
    .await
    .context("list product watchers")?;
    Ok(rows)
}
