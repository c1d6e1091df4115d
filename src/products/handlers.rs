use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{ProductView, SearchQuery, SearchResult},
    repo_types::{NewProduct, ProductRow},
    services::{notify_price_drop, parse_new, parse_patch},
};
use crate::{
    auth::extractors::AdminUser,
    categories::Category,
    error::{AppError, AppResult},
    images::{delete_image, settle_upload, upload_image, MultipartForm},
    pagination::PageQuery,
    response::{created, ok, ApiJson},
    state::AppState,
};

pub const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;
const PICTURE_FOLDER: &str = "products";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/all", get(list_products))
        .route("/search", get(search_products))
        .route("/:id", get(get_product))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product).delete(delete_product))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

#[instrument(skip(state))]
pub async fn list_products(State(state): State<AppState>) -> AppResult<ApiJson<Vec<ProductView>>> {
    let products = ProductRow::list_all(&state.db).await?;
    Ok(ok(
        "All products fetched",
        products.into_iter().map(ProductView::from).collect(),
    ))
}

#[instrument(skip(state))]
pub async fn search_products(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> AppResult<ApiJson<SearchResult>> {
    let page = PageQuery {
        page: q.page,
        limit: q.limit,
    }
    .resolve(10);
    let term = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let (rows, total) = ProductRow::search(&state.db, term, page).await?;
    Ok(ok(
        "Products fetched",
        SearchResult {
            products: rows.into_iter().map(ProductView::from).collect(),
            total,
            page: page.page,
            total_pages: page.total_pages(total),
        },
    ))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<ProductView>> {
    let product = ProductRow::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;
    Ok(ok("Product fetched", product.into()))
}

#[instrument(skip(state, mp))]
pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mp: Multipart,
) -> AppResult<(StatusCode, ApiJson<ProductView>)> {
    let form = MultipartForm::collect(mp).await?;
    let fields = parse_new(&form)?;
    let picture = form
        .file("picture")
        .ok_or_else(|| AppError::bad_request("Product picture is required"))?;

    if !Category::exists(&state.db, fields.category_id).await? {
        return Err(AppError::bad_request("Invalid category"));
    }

    let stored = upload_image(&state, PICTURE_FOLDER, picture).await?;
    let product = ProductRow::create(
        &state.db,
        NewProduct {
            title: fields.title,
            description: fields.description,
            category_id: fields.category_id,
            price: fields.price,
            discount: fields.discount,
            stock: fields.stock,
            picture_url: stored.url,
            picture_public_id: stored.public_id.clone(),
            user_id: admin.id,
        },
    )
    .await;

    let product = match product {
        Ok(p) => p,
        Err(e) => {
            delete_image(&state, &stored.public_id).await;
            return Err(e.into());
        }
    };

    info!(product_id = %product.id, "product created");
    Ok(created("Product created successfully", product.into()))
}

#[instrument(skip(state, _admin, mp))]
pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<ApiJson<ProductView>> {
    let form = MultipartForm::collect(mp).await?;
    let mut patch = parse_patch(&form)?;

    let before = ProductRow::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    if let Some(category_id) = patch.category_id {
        if !Category::exists(&state.db, category_id).await? {
            return Err(AppError::bad_request("Invalid category"));
        }
    }

    let uploaded = match form.file("picture") {
        Some(file) => {
            let stored = upload_image(&state, PICTURE_FOLDER, file).await?;
            patch.picture_url = Some(stored.url.clone());
            patch.picture_public_id = Some(stored.public_id.clone());
            Some(stored)
        }
        None => None,
    };

    let written = ProductRow::update(&state.db, id, patch).await;
    let after = settle_upload(&state, uploaded.as_ref(), written, "Product not found").await?;
    if uploaded.is_some() {
        delete_image(&state, &before.picture_public_id).await;
    }
    notify_price_drop(&state, &before, &after).await;

    info!(product_id = %id, "product updated");
    Ok(ok("Product updated successfully", after.into()))
}

#[instrument(skip(state, _admin))]
pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<ApiJson<ProductView>> {
    let product = ProductRow::delete(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;
    delete_image(&state, &product.picture_public_id).await;

    info!(product_id = %id, "product deleted");
    Ok(ok("Product deleted successfully", product.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{call, token_for};
    use crate::users::repo_types::User;

    #[tokio::test]
    async fn create_requires_admin_token() {
        let (status, _) = call(AppState::fake(), "POST", "/api/v1/products", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, body) = call(state, "DELETE", &format!("/api/v1/products/{}", Uuid::new_v4()), None, Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Admin access required");
    }
}
