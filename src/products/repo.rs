use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewProduct, ProductPatch, ProductRow};
use crate::pagination::Page;

pub(crate) const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.category_id,
           c.name AS category_name, c.slug AS category_slug,
           p.price, p.discount, p.stock, p.picture_url, p.picture_public_id,
           p.user_id, p.average_rating, p.num_reviews, p.created_at, p.updated_at
      FROM products p
      JOIN categories c ON c.id = p.category_id
"#;

/// `%term%` for ILIKE with the pattern metacharacters escaped, so a search
/// for "50%" matches the literal text.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

impl ProductRow {
    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<ProductRow>> {
        let sql = format!("{PRODUCT_SELECT} ORDER BY p.created_at DESC");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(db)
            .await
            .context("list products")?;
        Ok(rows)
    }

    /// Case-insensitive match on title or description; `None` matches all.
    pub async fn search(
        db: &PgPool,
        term: Option<&str>,
        page: Page,
    ) -> anyhow::Result<(Vec<ProductRow>, i64)> {
        let pattern = term.map(like_pattern);
        let filter = r#"WHERE ($1::text IS NULL
                            OR p.title ILIKE $1 ESCAPE '\'
                            OR p.description ILIKE $1 ESCAPE '\')"#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM products p {filter}"
        ))
        .bind(pattern.as_deref())
        .fetch_one(db)
        .await
        .context("count product search")?;

        let sql = format!("{PRODUCT_SELECT} {filter} ORDER BY p.created_at DESC LIMIT $2 OFFSET $3");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(pattern.as_deref())
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(db)
            .await
            .context("search products")?;
        Ok((rows, total))
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<ProductRow>> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find product")?;
        Ok(row)
    }

    pub async fn find_many(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<ProductRow>> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.id = ANY($1)");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(ids)
            .fetch_all(db)
            .await
            .context("find products by id")?;
        Ok(rows)
    }

    pub async fn create(db: &PgPool, new: NewProduct) -> anyhow::Result<ProductRow> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO products
                (title, description, category_id, price, discount, stock,
                 picture_url, picture_public_id, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(new.title)
        .bind(new.description)
        .bind(new.category_id)
        .bind(new.price)
        .bind(new.discount)
        .bind(new.stock)
        .bind(new.picture_url)
        .bind(new.picture_public_id)
        .bind(new.user_id)
        .fetch_one(db)
        .await
        .context("insert product")?;

        Self::find(db, id)
            .await?
            .context("product vanished after insert")
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        patch: ProductPatch,
    ) -> anyhow::Result<Option<ProductRow>> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE products
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   category_id = COALESCE($4, category_id),
                   price = COALESCE($5, price),
                   discount = COALESCE($6, discount),
                   stock = COALESCE($7, stock),
                   picture_url = COALESCE($8, picture_url),
                   picture_public_id = COALESCE($9, picture_public_id),
                   updated_at = now()
             WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.category_id)
        .bind(patch.price)
        .bind(patch.discount)
        .bind(patch.stock)
        .bind(patch.picture_url)
        .bind(patch.picture_public_id)
        .fetch_optional(db)
        .await
        .context("update product")?;

        match updated {
            Some(id) => Self::find(db, id).await,
            None => Ok(None),
        }
    }

    /// Deletes and returns the product so the caller can drop its picture.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<ProductRow>> {
        let Some(row) = Self::find(db, id).await? else {
            return Ok(None);
        };
        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("delete product")?
            .rows_affected();
        Ok((deleted > 0).then_some(row))
    }

    /// Takes `qty` off the stock in one statement, flooring at zero.
    /// Returns the title and the new stock, or `None` for an unknown product.
    pub async fn decrement_stock(
        db: &PgPool,
        id: Uuid,
        qty: i32,
    ) -> anyhow::Result<Option<(String, i32)>> {
        let row: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE products
               SET stock = GREATEST(stock - $2, 0), updated_at = now()
             WHERE id = $1
            RETURNING title, stock
            "#,
        )
        .bind(id)
        .bind(qty)
        .fetch_optional(db)
        .await
        .context("decrement stock")?;
        Ok(row)
    }

    pub async fn exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(db)
            .await
            .context("check product exists")?;
        Ok(found)
    }
}
