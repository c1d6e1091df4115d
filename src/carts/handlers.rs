use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    dto::{AddToCartRequest, CartLine, CartView, RemoveFromCartRequest},
    repo,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    products::{ProductRow, ProductView},
    response::{done, ok, ApiJson},
    state::AppState,
};

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_to_cart))
        .route("/remove", post(remove_from_cart))
        .route("/clear", post(clear_cart))
}

async fn load(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let lines = repo::items_with_products(&state.db, user_id)
        .await?
        .into_iter()
        .map(|(product, quantity)| CartLine {
            product: ProductView::from(product),
            quantity,
        })
        .collect();
    Ok(CartView::new(user_id, lines))
}

#[instrument(skip(state))]
pub async fn get_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<ApiJson<CartView>> {
    repo::ensure(&state.db, auth.id).await?;
    Ok(ok("Cart fetched", load(&state, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<ApiJson<CartView>> {
    if payload.quantity < 1 {
        return Err(AppError::bad_request("Quantity must be at least 1"));
    }
    if !ProductRow::exists(&state.db, payload.product_id).await? {
        return Err(AppError::not_found("Product not found"));
    }

    repo::set_quantity(&state.db, auth.id, payload.product_id, payload.quantity).await?;
    debug!(user_id = %auth.id, product_id = %payload.product_id, qty = payload.quantity, "cart line set");
    Ok(ok("Cart updated", load(&state, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RemoveFromCartRequest>,
) -> AppResult<ApiJson<CartView>> {
    repo::remove(&state.db, auth.id, payload.product_id).await?;
    Ok(ok("Item removed from cart", load(&state, auth.id).await?))
}

#[instrument(skip(state))]
pub async fn clear_cart(State(state): State<AppState>, auth: AuthUser) -> AppResult<ApiJson<()>> {
    repo::clear(&state.db, auth.id).await?;
    Ok(done("Cart cleared"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{call, token_for};
    use crate::users::repo_types::User;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn cart_needs_auth() {
        let (status, _) = call(AppState::fake(), "GET", "/api/v1/cart", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_lookup() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, body) = call(
            state,
            "POST",
            "/api/v1/cart/add",
            Some(json!({ "productId": Uuid::new_v4(), "quantity": 0 })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Quantity must be at least 1");
    }
}
