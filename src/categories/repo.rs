use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Category {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, created_at, updated_at FROM categories ORDER BY name",
        )
        .fetch_all(db)
        .await
        .context("list categories")?;
        Ok(rows)
    }

    pub async fn find_by_slug(db: &PgPool, slug: &str) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, created_at, updated_at FROM categories WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(db)
        .await
        .context("find category by slug")?;
        Ok(row)
    }

    pub async fn exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
            .bind(id)
            .fetch_one(db)
            .await
            .context("check category exists")?;
        Ok(found)
    }

    /// True when another category already uses the name or the slug.
    pub async fn name_taken(db: &PgPool, name: &str, slug: &str) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE lower(name) = lower($1) OR slug = $2)",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(db)
        .await
        .context("check category name")?;
        Ok(found)
    }

    pub async fn create(db: &PgPool, name: &str, slug: &str) -> anyhow::Result<Category> {
        let row = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, slug)
            VALUES ($1, $2)
            RETURNING id, name, slug, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(slug)
        .fetch_one(db)
        .await
        .context("insert category")?;
        Ok(row)
    }

    pub async fn rename(
        db: &PgPool,
        slug: &str,
        name: &str,
        new_slug: &str,
    ) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
               SET name = $2, slug = $3, updated_at = now()
             WHERE slug = $1
            RETURNING id, name, slug, created_at, updated_at
            "#,
        )
        .bind(slug)
        .bind(name)
        .bind(new_slug)
        .fetch_optional(db)
        .await
        .context("rename category")?;
        Ok(row)
    }

    pub async fn delete_by_slug(db: &PgPool, slug: &str) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(
            "DELETE FROM categories WHERE slug = $1 RETURNING id, name, slug, created_at, updated_at",
        )
        .bind(slug)
        .fetch_optional(db)
        .await
        .context("delete category")?;
        Ok(row)
    }

    pub async fn has_products(db: &PgPool, slug: &str) -> anyhow::Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM products p JOIN categories c ON c.id = p.category_id
                 WHERE c.slug = $1
            )
            "#,
        )
        .bind(slug)
        .fetch_one(db)
        .await
        .context("check category in use")?;
        Ok(found)
    }
}
