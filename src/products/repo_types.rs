use rust_decimal::Decimal;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Product joined with its category, as every read query returns it.
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Uuid,
    pub category_name: String,
    pub category_slug: String,
    pub price: Decimal,
    pub discount: i32,
    pub stock: i32,
    pub picture_url: String,
    pub picture_public_id: String,
    pub user_id: Option<Uuid>,
    pub average_rating: f64,
    pub num_reviews: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub category_id: Uuid,
    pub price: Decimal,
    pub discount: i32,
    pub stock: i32,
    pub picture_url: String,
    pub picture_public_id: String,
    pub user_id: Uuid,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub price: Option<Decimal>,
    pub discount: Option<i32>,
    pub stock: Option<i32>,
    pub picture_url: Option<String>,
    pub picture_public_id: Option<String>,
}
