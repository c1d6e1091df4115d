use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::ProductRow;
use crate::images::StoredImage;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Product as the storefront renders it, category and picture nested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: CategoryRef,
    pub price: Decimal,
    pub discount: i32,
    pub stock: i32,
    pub picture: StoredImage,
    pub user: Option<Uuid>,
    pub average_rating: f64,
    pub num_reviews: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ProductRow> for ProductView {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category: CategoryRef {
                id: row.category_id,
                name: row.category_name,
                slug: row.category_slug,
            },
            price: row.price,
            discount: row.discount,
            stock: row.stock,
            picture: StoredImage {
                url: row.picture_url,
                public_id: row.picture_public_id,
            },
            user: row.user_id,
            average_rating: row.average_rating,
            num_reviews: row.num_reviews,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub products: Vec<ProductView>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}
