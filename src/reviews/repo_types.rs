use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::images::StoredImage;

/// A review joined with its author, its product and its helpful-vote count.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub images: Json<Vec<StoredImage>>,
    pub verified: bool,
    pub admin_reply_text: Option<String>,
    pub admin_reply_at: Option<OffsetDateTime>,
    pub helpful_count: i64,
    pub reviewer_name: String,
    pub reviewer_avatar: String,
    pub reviewer_email: Option<String>,
    pub product_title: String,
    pub product_picture_url: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub images: Vec<StoredImage>,
}

/// Partial review edit. `images` are appended to the existing ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPatch {
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub images: Vec<StoredImage>,
}
