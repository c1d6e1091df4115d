use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::ReviewRow;
use crate::{images::StoredImage, pagination::Page};

#[derive(Debug, Clone, Serialize)]
pub struct Reviewer {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedProduct {
    pub id: Uuid,
    pub title: String,
    pub picture_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminReply {
    pub text: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: Uuid,
    pub product: ReviewedProduct,
    pub user: Reviewer,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub images: Vec<StoredImage>,
    pub helpful_count: i64,
    pub verified: bool,
    pub admin_reply: Option<AdminReply>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReviewView {
    /// Includes the reviewer's email; admin listings only.
    pub fn with_email(row: ReviewRow) -> Self {
        let email = row.reviewer_email.clone();
        let mut view = Self::from(row);
        view.user.email = email;
        view
    }
}

impl From<ReviewRow> for ReviewView {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            product: ReviewedProduct {
                id: row.product_id,
                title: row.product_title,
                picture_url: row.product_picture_url,
            },
            user: Reviewer {
                id: row.user_id,
                name: row.reviewer_name,
                avatar: row.reviewer_avatar,
                email: None,
            },
            rating: row.rating,
            title: row.title,
            comment: row.comment,
            images: row.images.0,
            helpful_count: row.helpful_count,
            verified: row.verified,
            admin_reply: row.admin_reply_text.map(|text| AdminReply {
                text,
                date: row.admin_reply_at,
            }),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub total_reviews: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

impl ReviewPage {
    pub fn new(reviews: Vec<ReviewView>, total: i64, page: Page) -> Self {
        Self {
            reviews,
            total_reviews: total,
            current_page: page.page,
            total_pages: page.total_pages(total),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulToggle {
    pub helpful_count: i64,
    pub is_helpful: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub text: String,
}
