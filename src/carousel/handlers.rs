use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, put},
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::{CarouselImage, CarouselPatch, NewCarouselImage};
use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppResult},
    images::{delete_image, multipart::parse_bool, settle_upload, upload_image, MultipartForm},
    response::{created, ok, ApiJson},
    state::AppState,
};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;
const IMAGE_FOLDER: &str = "carousel";

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/images", get(active_images))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/images", get(all_images).post(add_image))
        .route("/admin/images/:id", put(update_image).delete(delete_carousel_image))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

fn parse_patch(form: &MultipartForm) -> AppResult<CarouselPatch> {
    let is_active = match form.text("isActive") {
        None => None,
        Some(raw) => Some(
            parse_bool(raw).ok_or_else(|| AppError::bad_request("Invalid value for isActive"))?,
        ),
    };
    Ok(CarouselPatch {
        title: form.text_owned("title"),
        description: form
            .raw("description")
            .map(|d| Some(d.trim().to_string()).filter(|d| !d.is_empty())),
        sort_order: form.parse::<i32>("order")?,
        is_active,
        image_url: None,
        public_id: None,
    })
}

#[instrument(skip(state))]
pub async fn active_images(
    State(state): State<AppState>,
) -> AppResult<ApiJson<Vec<CarouselImage>>> {
    let images = CarouselImage::list(&state.db, true).await?;
    Ok(ok("Carousel images fetched successfully", images))
}

#[instrument(skip(state, _admin))]
pub async fn all_images(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<ApiJson<Vec<CarouselImage>>> {
    let images = CarouselImage::list(&state.db, false).await?;
    Ok(ok("Carousel images fetched successfully", images))
}

#[instrument(skip(state, mp))]
pub async fn add_image(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mp: Multipart,
) -> AppResult<(StatusCode, ApiJson<CarouselImage>)> {
    let form = MultipartForm::collect(mp).await?;
    let (Some(title), Some(file)) = (form.text_owned("title"), form.file("image")) else {
        return Err(AppError::bad_request("Title and image are required"));
    };
    let sort_order = form.parse::<i32>("order")?.unwrap_or(0);

    let stored = upload_image(&state, IMAGE_FOLDER, file).await?;
    let inserted = CarouselImage::create(
        &state.db,
        NewCarouselImage {
            title,
            description: form.text_owned("description"),
            image_url: stored.url,
            public_id: stored.public_id.clone(),
            sort_order,
            user_id: admin.id,
        },
    )
    .await;

    let image = match inserted {
        Ok(image) => image,
        Err(e) => {
            delete_image(&state, &stored.public_id).await;
            return Err(e.into());
        }
    };

    info!(image_id = %image.id, "carousel image added");
    Ok(created("Carousel image added successfully", image))
}

#[instrument(skip(state, _admin, mp))]
pub async fn update_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<ApiJson<CarouselImage>> {
    let form = MultipartForm::collect(mp).await?;
    let mut patch = parse_patch(&form)?;

    let before = CarouselImage::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Carousel image not found"))?;

    let uploaded = match form.file("image") {
        Some(file) => {
            let stored = upload_image(&state, IMAGE_FOLDER, file).await?;
            patch.image_url = Some(stored.url.clone());
            patch.public_id = Some(stored.public_id.clone());
            Some(stored)
        }
        None => None,
    };

    let written = CarouselImage::update(&state.db, id, patch).await;
    let after = settle_upload(&state, uploaded.as_ref(), written, "Carousel image not found").await?;
    if uploaded.is_some() {
        delete_image(&state, &before.public_id).await;
    }

    info!(image_id = %id, "carousel image updated");
    Ok(ok("Carousel image updated successfully", after))
}

#[instrument(skip(state, _admin))]
pub async fn delete_carousel_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<CarouselImage>> {
    let image = CarouselImage::delete(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Carousel image not found"))?;
    delete_image(&state, &image.public_id).await;

    info!(image_id = %id, "carousel image deleted");
    Ok(ok("Carousel image deleted successfully", image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::call;

    #[test]
    fn patch_reads_only_present_fields() {
        let form = MultipartForm::from_parts(&[("order", "3"), ("isActive", "false")], vec![]);
        let patch = parse_patch(&form).unwrap();
        assert_eq!(patch.sort_order, Some(3));
        assert_eq!(patch.is_active, Some(false));
        assert_eq!(patch.title, None);
        assert_eq!(patch.description, None);
    }

    #[test]
    fn empty_description_clears_it() {
        let form = MultipartForm::from_parts(&[("description", "  ")], vec![]);
        assert_eq!(parse_patch(&form).unwrap().description, Some(None));
    }

    #[test]
    fn garbage_flags_are_rejected() {
        let form = MultipartForm::from_parts(&[("isActive", "maybe")], vec![]);
        assert!(parse_patch(&form).is_err());
        let form = MultipartForm::from_parts(&[("order", "first")], vec![]);
        assert!(parse_patch(&form).is_err());
    }

    #[tokio::test]
    async fn admin_listing_needs_a_token() {
        let (status, _) = call(
            AppState::fake(),
            "GET",
            "/api/v1/carousel/admin/images",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
