use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::repo_types::{NewReview, ReviewPatch, ReviewRow};
use crate::{images::StoredImage, pagination::Page};

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.product_id, r.user_id, r.rating, r.title, r.comment, r.images,
           r.verified, r.admin_reply_text, r.admin_reply_at,
           (SELECT COUNT(*) FROM review_helpful_votes v WHERE v.review_id = r.id) AS helpful_count,
           u.name AS reviewer_name, u.avatar AS reviewer_avatar, u.email AS reviewer_email,
           p.title AS product_title, p.picture_url AS product_picture_url,
           r.created_at, r.updated_at
      FROM reviews r
      JOIN users u ON u.id = r.user_id
      JOIN products p ON p.id = r.product_id
"#;

impl ReviewRow {
    async fn page_where(
        db: &PgPool,
        filter: &str,
        key: Option<Uuid>,
        page: Page,
    ) -> anyhow::Result<(Vec<ReviewRow>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM reviews r {filter}"))
            .bind(key)
            .fetch_one(db)
            .await
            .context("count reviews")?;

        let sql = format!(
            "{REVIEW_SELECT} {filter} ORDER BY r.created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(key)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(db)
            .await
            .context("list reviews")?;
        Ok((rows, total))
    }

    pub async fn list_for_product(
        db: &PgPool,
        product_id: Uuid,
        page: Page,
    ) -> anyhow::Result<(Vec<ReviewRow>, i64)> {
        Self::page_where(db, "WHERE r.product_id = $1", Some(product_id), page).await
    }

    pub async fn list_for_user(
        db: &PgPool,
        user_id: Uuid,
        page: Page,
    ) -> anyhow::Result<(Vec<ReviewRow>, i64)> {
        Self::page_where(db, "WHERE r.user_id = $1", Some(user_id), page).await
    }

    pub async fn list_all(db: &PgPool, page: Page) -> anyhow::Result<(Vec<ReviewRow>, i64)> {
        Self::page_where(db, "WHERE $1::uuid IS NULL", None, page).await
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<ReviewRow>> {
        let sql = format!("{REVIEW_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find review")?;
        Ok(row)
    }

    pub async fn exists_for(db: &PgPool, product_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE product_id = $1 AND user_id = $2)",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("check existing review")?;
        Ok(exists)
    }

    /// Inserts and returns the new review's id. A second review of the same
    /// product by the same user fails with a unique violation.
    pub async fn create(db: &PgPool, new: NewReview) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO reviews (product_id, user_id, rating, title, comment, images)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(new.product_id)
        .bind(new.user_id)
        .bind(new.rating)
        .bind(new.title)
        .bind(new.comment)
        .bind(Json(new.images))
        .fetch_one(db)
        .await
        .context("insert review")?;
        Ok(id)
    }

    pub async fn update(db: &PgPool, id: Uuid, patch: ReviewPatch) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE reviews
               SET rating = COALESCE($2, rating),
                   title = COALESCE($3, title),
                   comment = COALESCE($4, comment),
                   images = images || $5,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.rating)
        .bind(patch.title)
        .bind(patch.comment)
        .bind(Json(patch.images))
        .execute(db)
        .await
        .context("update review")?;
        Ok(res.rows_affected() > 0)
    }

    /// Deletes the review, handing back what the caller must clean up.
    pub async fn delete(
        db: &PgPool,
        id: Uuid,
    ) -> anyhow::Result<Option<(Uuid, Vec<StoredImage>)>> {
        let row: Option<(Uuid, Json<Vec<StoredImage>>)> = sqlx::query_as(
            "DELETE FROM reviews WHERE id = $1 RETURNING product_id, images",
        )
        .bind(id)
        .fetch_optional(db)
        .await
        .context("delete review")?;
        Ok(row.map(|(product_id, Json(images))| (product_id, images)))
    }

    pub async fn toggle_verified(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE reviews SET verified = NOT verified, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await
        .context("toggle review verification")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_reply(db: &PgPool, id: Uuid, text: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE reviews
               SET admin_reply_text = $2, admin_reply_at = now(), updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(text)
        .execute(db)
        .await
        .context("reply to review")?;
        Ok(res.rows_affected() > 0)
    }

    /// Flips the caller's helpful vote. Returns the new vote count and
    /// whether the caller now counts as having voted.
    pub async fn toggle_helpful(
        db: &PgPool,
        review_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<(i64, bool)> {
        let mut tx = db.begin().await.context("begin helpful toggle")?;

        let removed = sqlx::query(
            "DELETE FROM review_helpful_votes WHERE review_id = $1 AND user_id = $2",
        )
        .bind(review_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("remove helpful vote")?
        .rows_affected()
            > 0;

        if !removed {
            sqlx::query(
                r#"
                INSERT INTO review_helpful_votes (review_id, user_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(review_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("add helpful vote")?;
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM review_helpful_votes WHERE review_id = $1")
                .bind(review_id)
                .fetch_one(&mut *tx)
                .await
                .context("count helpful votes")?;

        tx.commit().await.context("commit helpful toggle")?;
        Ok((count, !removed))
    }

    /// Recomputes the product's average rating (one decimal) and review count.
    pub async fn refresh_rating(db: &PgPool, product_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE products
               SET average_rating = COALESCE(
                       (SELECT ROUND(AVG(rating)::numeric, 1)::float8
                          FROM reviews WHERE product_id = $1), 0),
                   num_reviews = (SELECT COUNT(*) FROM reviews WHERE product_id = $1)::int,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(product_id)
        .execute(db)
        .await
        .context("refresh product rating")?;
        Ok(())
    }
}
