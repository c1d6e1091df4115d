use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{dto::CategoryRequest, repo::Category, services::slugify};
use crate::{
    auth::extractors::AdminUser,
    error::{is_unique_violation, AppError, AppResult},
    response::{created, ok, ApiJson},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_category))
        .route(
            "/:slug",
            get(get_category).put(update_category).delete(delete_category),
        )
}

/// Trims the requested name and derives its slug; both must be non-empty.
fn name_and_slug(req: &CategoryRequest) -> AppResult<(String, String)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Category name is required"));
    }
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(AppError::bad_request(
            "Category name must contain letters or digits",
        ));
    }
    Ok((name.to_string(), slug))
}

#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<ApiJson<Vec<Category>>> {
    let categories = Category::list(&state.db).await?;
    Ok(ok("All categories fetched", categories))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CategoryRequest>,
) -> AppResult<(StatusCode, ApiJson<Category>)> {
    let (name, slug) = name_and_slug(&payload)?;

    if Category::name_taken(&state.db, &name, &slug).await? {
        return Err(AppError::bad_request("Category already exist"));
    }

    let category = Category::create(&state.db, &name, &slug)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::bad_request("Category already exist")
            } else {
                AppError::Internal(e)
            }
        })?;

    info!(slug = %category.slug, "category created");
    Ok(created("Category created successfully", category))
}

#[instrument(skip(state, _admin))]
pub async fn get_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
) -> AppResult<ApiJson<Category>> {
    let category = Category::find_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))?;
    Ok(ok("Category fetched successfully", category))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
    Json(payload): Json<CategoryRequest>,
) -> AppResult<ApiJson<Category>> {
    let (name, new_slug) = name_and_slug(&payload)?;

    let category = Category::rename(&state.db, &slug, &name, &new_slug)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::bad_request("Category already exist")
            } else {
                AppError::Internal(e)
            }
        })?
        .ok_or_else(|| AppError::not_found("Category not found"))?;

    info!(from = %slug, to = %category.slug, "category renamed");
    Ok(ok("Category updated successfully", category))
}

#[instrument(skip(state, _admin))]
pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(slug): Path<String>,
) -> AppResult<ApiJson<Category>> {
    if Category::has_products(&state.db, &slug).await? {
        warn!(slug = %slug, "refusing to delete category in use");
        return Err(AppError::bad_request(
            "Category still has products; move or delete them first",
        ));
    }

    let category = Category::delete_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| AppError::not_found("Category not found"))?;
    info!(slug = %slug, "category deleted");
    Ok(ok("Category deleted successfully", category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{call, seed_user, token_as, token_for, with_db};
    use crate::users::repo_types::User;
    use serde_json::json;

    #[test]
    fn blank_names_are_rejected() {
        let err = name_and_slug(&CategoryRequest { name: "   ".into() }).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Category name is required");
        assert!(name_and_slug(&CategoryRequest { name: "???".into() }).is_err());
    }

    #[test]
    fn names_are_trimmed_and_slugged() {
        let (name, slug) = name_and_slug(&CategoryRequest {
            name: "  Home Appliances ".into(),
        })
        .unwrap();
        assert_eq!(name, "Home Appliances");
        assert_eq!(slug, "home-appliances");
    }

    #[tokio::test]
    async fn writes_need_a_token() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/categories",
            Some(json!({ "name": "Shoes" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn writes_need_an_admin() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, _) = call(
            state,
            "DELETE",
            "/api/v1/categories/shoes",
            None,
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_category_is_a_bad_request(db: sqlx::PgPool) {
        let admin = seed_user(&db, "boss@shop.test", User::ROLE_ADMIN).await;
        let state = with_db(db);
        let token = token_as(&state, admin, User::ROLE_ADMIN);

        let (status, body) = call(
            state.clone(),
            "POST",
            "/api/v1/categories",
            Some(json!({ "name": "Home Appliances" })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["slug"], "home-appliances");

        let (status, body) = call(
            state.clone(),
            "POST",
            "/api/v1/categories",
            Some(json!({ "name": "home appliances" })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Category already exist");

        let err = Category::create(&state.db, "Home Appliances", "home-appliances")
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
