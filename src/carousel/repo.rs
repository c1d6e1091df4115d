use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

const CAROUSEL_COLUMNS: &str = "id, title, description, image_url, public_id, sort_order, \
                                is_active, user_id, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CarouselImage {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub public_id: String,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub is_active: bool,
    pub user_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCarouselImage {
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub public_id: String,
    pub sort_order: i32,
    pub user_id: Uuid,
}

/// `None` leaves a column unchanged; an empty description clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarouselPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub image_url: Option<String>,
    pub public_id: Option<String>,
}

impl CarouselImage {
    pub async fn list(db: &PgPool, active_only: bool) -> anyhow::Result<Vec<CarouselImage>> {
        let sql = format!(
            "SELECT {CAROUSEL_COLUMNS} FROM carousel_images \
             WHERE ($1 = FALSE OR is_active) \
             ORDER BY sort_order ASC, created_at DESC"
        );
        let rows = sqlx::query_as::<_, CarouselImage>(&sql)
            .bind(active_only)
            .fetch_all(db)
            .await
            .context("list carousel images")?;
        Ok(rows)
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CarouselImage>> {
        let sql = format!("SELECT {CAROUSEL_COLUMNS} FROM carousel_images WHERE id = $1");
        let row = sqlx::query_as::<_, CarouselImage>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find carousel image")?;
        Ok(row)
    }

    pub async fn create(db: &PgPool, new: NewCarouselImage) -> anyhow::Result<CarouselImage> {
        let sql = format!(
            r#"
            INSERT INTO carousel_images (title, description, image_url, public_id, sort_order, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CAROUSEL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CarouselImage>(&sql)
            .bind(new.title)
            .bind(new.description)
            .bind(new.image_url)
            .bind(new.public_id)
            .bind(new.sort_order)
            .bind(new.user_id)
            .fetch_one(db)
            .await
            .context("insert carousel image")?;
        Ok(row)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        patch: CarouselPatch,
    ) -> anyhow::Result<Option<CarouselImage>> {
        let sql = format!(
            r#"
            UPDATE carousel_images
               SET title = COALESCE($2, title),
                   description = CASE WHEN $3 THEN $4 ELSE description END,
                   sort_order = COALESCE($5, sort_order),
                   is_active = COALESCE($6, is_active),
                   image_url = COALESCE($7, image_url),
                   public_id = COALESCE($8, public_id),
                   updated_at = now()
             WHERE id = $1
            RETURNING {CAROUSEL_COLUMNS}
            "#
        );
        let (set_description, description) = match patch.description {
            Some(value) => (true, value),
            None => (false, None),
        };
        let row = sqlx::query_as::<_, CarouselImage>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(set_description)
            .bind(description)
            .bind(patch.sort_order)
            .bind(patch.is_active)
            .bind(patch.image_url)
            .bind(patch.public_id)
            .fetch_optional(db)
            .await
            .context("update carousel image")?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<CarouselImage>> {
        let sql = format!("DELETE FROM carousel_images WHERE id = $1 RETURNING {CAROUSEL_COLUMNS}");
        let row = sqlx::query_as::<_, CarouselImage>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("delete carousel image")?;
        Ok(row)
    }
}
