use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{HelpfulToggle, ReplyRequest, ReviewPage, ReviewView},
    repo_types::{NewReview, ReviewRow},
    services::{check_room_for_images, discard_images, parse_new, parse_patch, upload_images},
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{is_unique_violation, AppError, AppResult},
    images::MultipartForm,
    pagination::PageQuery,
    products::ProductRow,
    response::{created, done, ok, ApiJson},
    state::AppState,
};

const UPLOAD_LIMIT: usize = 25 * 1024 * 1024;
const PAGE_SIZE: i64 = 10;
const ADMIN_PAGE_SIZE: i64 = 20;

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/product/:product_id", get(product_reviews))
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews/me", get(my_reviews))
        .route("/review/:id/helpful", post(toggle_helpful))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/review/new", post(create_review))
        .route(
            "/review/:id",
            get(get_review).put(update_review).delete(delete_review),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reviews", get(all_reviews))
        .route("/admin/review/:id/verify", put(verify_review))
        .route("/admin/review/:id/reply", put(reply_to_review))
}

/// Rating upkeep never fails the request that triggered it.
async fn refresh_rating(state: &AppState, product_id: Uuid) {
    if let Err(e) = ReviewRow::refresh_rating(&state.db, product_id).await {
        warn!(error = %format!("{e:#}"), product_id = %product_id, "rating refresh failed");
    }
}

async fn load(state: &AppState, id: Uuid) -> AppResult<ReviewRow> {
    ReviewRow::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))
}

#[instrument(skip(state))]
pub async fn product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> AppResult<ApiJson<ReviewPage>> {
    let page = q.resolve(PAGE_SIZE);
    let (rows, total) = ReviewRow::list_for_product(&state.db, product_id, page).await?;
    Ok(ok(
        "Reviews fetched",
        ReviewPage::new(rows.into_iter().map(ReviewView::from).collect(), total, page),
    ))
}

#[instrument(skip(state))]
pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<ReviewView>> {
    Ok(ok("Review fetched", load(&state, id).await?.into()))
}

#[instrument(skip(state, mp))]
pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, ApiJson<ReviewView>)> {
    let form = MultipartForm::collect(mp).await?;
    let fields = parse_new(&form)?;

    if !ProductRow::exists(&state.db, fields.product_id).await? {
        return Err(AppError::not_found("Product not found"));
    }
    if ReviewRow::exists_for(&state.db, fields.product_id, auth.id).await? {
        return Err(AppError::bad_request("You have already reviewed this product"));
    }

    let images = upload_images(&state, &form).await?;
    let inserted = ReviewRow::create(
        &state.db,
        NewReview {
            product_id: fields.product_id,
            user_id: auth.id,
            rating: fields.rating,
            title: fields.title,
            comment: fields.comment,
            images: images.clone(),
        },
    )
    .await;

    let id = match inserted {
        Ok(id) => id,
        Err(e) => {
            discard_images(&state, &images).await;
            if is_unique_violation(&e) {
                return Err(AppError::bad_request("You have already reviewed this product"));
            }
            return Err(e.into());
        }
    };

    refresh_rating(&state, fields.product_id).await;
    info!(review_id = %id, product_id = %fields.product_id, "review created");
    Ok(created("Review created successfully", load(&state, id).await?.into()))
}

#[instrument(skip(state, mp))]
pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<ApiJson<ReviewView>> {
    let form = MultipartForm::collect(mp).await?;
    let mut patch = parse_patch(&form)?;

    let existing = load(&state, id).await?;
    if existing.user_id != auth.id {
        return Err(AppError::forbidden("You can only update your own reviews"));
    }
    check_room_for_images(existing.images.0.len(), &form)?;

    patch.images = upload_images(&state, &form).await?;
    let added = patch.images.clone();
    match ReviewRow::update(&state.db, id, patch).await {
        Ok(true) => {}
        Ok(false) => {
            discard_images(&state, &added).await;
            return Err(AppError::not_found("Review not found"));
        }
        Err(e) => {
            discard_images(&state, &added).await;
            return Err(e.into());
        }
    }

    refresh_rating(&state, existing.product_id).await;
    info!(review_id = %id, "review updated");
    Ok(ok("Review updated successfully", load(&state, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<()>> {
    let existing = load(&state, id).await?;
    if existing.user_id != auth.id && !auth.is_admin() {
        return Err(AppError::forbidden("You can only delete your own reviews"));
    }

    let (product_id, images) = ReviewRow::delete(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found"))?;
    discard_images(&state, &images).await;
    refresh_rating(&state, product_id).await;

    info!(review_id = %id, "review deleted");
    Ok(done("Review deleted successfully"))
}

#[instrument(skip(state))]
pub async fn toggle_helpful(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<HelpfulToggle>> {
    load(&state, id).await?;
    let (helpful_count, is_helpful) = ReviewRow::toggle_helpful(&state.db, id, auth.id).await?;
    Ok(ok(
        "Helpful vote updated",
        HelpfulToggle {
            helpful_count,
            is_helpful,
        },
    ))
}

#[instrument(skip(state))]
pub async fn my_reviews(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<PageQuery>,
) -> AppResult<ApiJson<ReviewPage>> {
    let page = q.resolve(PAGE_SIZE);
    let (rows, total) = ReviewRow::list_for_user(&state.db, auth.id, page).await?;
    Ok(ok(
        "Reviews fetched",
        ReviewPage::new(rows.into_iter().map(ReviewView::from).collect(), total, page),
    ))
}

#[instrument(skip(state, _admin))]
pub async fn all_reviews(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<PageQuery>,
) -> AppResult<ApiJson<ReviewPage>> {
    let page = q.resolve(ADMIN_PAGE_SIZE);
    let (rows, total) = ReviewRow::list_all(&state.db, page).await?;
    Ok(ok(
        "Reviews fetched",
        ReviewPage::new(
            rows.into_iter().map(ReviewView::with_email).collect(),
            total,
            page,
        ),
    ))
}

#[instrument(skip(state, _admin))]
pub async fn verify_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<ReviewView>> {
    if !ReviewRow::toggle_verified(&state.db, id).await? {
        return Err(AppError::not_found("Review not found"));
    }
    let review = load(&state, id).await?;
    info!(review_id = %id, verified = review.verified, "review verification toggled");
    Ok(ok("Review verification updated", review.into()))
}

#[instrument(skip(state, _admin, payload))]
pub async fn reply_to_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplyRequest>,
) -> AppResult<ApiJson<ReviewView>> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("Reply text is required"));
    }
    if !ReviewRow::set_reply(&state.db, id, text).await? {
        return Err(AppError::not_found("Review not found"));
    }
    Ok(ok("Reply added successfully", load(&state, id).await?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::call;

    #[tokio::test]
    async fn creating_a_review_needs_a_login() {
        let (status, _) = call(AppState::fake(), "POST", "/api/v1/review/new", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn my_reviews_needs_a_login() {
        let (status, _) = call(AppState::fake(), "GET", "/api/v1/reviews/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_listing_rejects_anonymous_callers() {
        let (status, _) = call(AppState::fake(), "GET", "/api/v1/admin/reviews", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
