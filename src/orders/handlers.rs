use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateOrderRequest, CreateStripeOrderRequest, OrderList, UpdateStripeOrderRequest},
    repo_types::{NewOrder, Order, PaymentMethod, PaymentStatus},
    services::{apply_stock_once, items_total, validate_items},
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{is_unique_violation, AppError, AppResult},
    response::{created, ok, ApiJson},
    state::AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_cod_order))
        .route("/create-stripe-order", post(create_stripe_order))
        .route("/update-stripe-order/:order_id", put(update_stripe_order))
        .route("/user/:user_id", get(user_orders))
        .route("/all", get(all_orders))
}

/// Reloads after stock handling so the response reflects the final row.
async fn reload(state: &AppState, order: Order) -> AppResult<Order> {
    Ok(Order::find(&state.db, order.id).await?.unwrap_or(order))
}

#[instrument(skip(state, payload))]
pub async fn create_cod_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, ApiJson<Order>)> {
    validate_items(&payload.cart_items)?;

    let order = Order::insert(
        &state.db,
        NewOrder {
            total_amount: items_total(&payload.cart_items),
            items: payload.cart_items,
            payment_status: payload.payment_status.unwrap_or(PaymentStatus::Pending),
            payment_method: PaymentMethod::Cod,
            stripe_session_id: None,
            customer_id: Some(auth.id),
            customer_name: payload.customer_name,
            customer_email: payload.customer_email,
            shipment_address: payload.shipment_address,
        },
    )
    .await?;

    apply_stock_once(&state, order.id).await;
    info!(order_id = %order.id, total = %order.total_amount, "cod order placed");
    Ok(created("Order placed successfully", reload(&state, order).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_stripe_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateStripeOrderRequest>,
) -> AppResult<(StatusCode, ApiJson<Order>)> {
    let session_id = payload
        .stripe_session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing stripeSessionId"))?
        .to_string();
    validate_items(&payload.cart_items)?;

    let total = payload
        .total_amount
        .filter(|t| !t.is_sign_negative())
        .unwrap_or_else(|| items_total(&payload.cart_items));

    let order = Order::upsert_for_session(
        &state.db,
        NewOrder {
            items: payload.cart_items,
            total_amount: total,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Stripe,
            stripe_session_id: Some(session_id),
            customer_id: Some(auth.id),
            customer_name: payload.customer_name,
            customer_email: payload.customer_email,
            shipment_address: payload.shipment_address,
        },
    )
    .await?;

    apply_stock_once(&state, order.id).await;
    info!(order_id = %order.id, "stripe order recorded");
    Ok(created("Order placed successfully", reload(&state, order).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_stripe_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStripeOrderRequest>,
) -> AppResult<ApiJson<Order>> {
    let existing = Order::find(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;
    if existing.customer_id != Some(auth.id) && !auth.is_admin() {
        return Err(AppError::forbidden("Not your order"));
    }

    let session_id = payload
        .stripe_session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let order = Order::update_payment(&state.db, order_id, session_id, payload.payment_status)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::bad_request("Stripe session already belongs to another order")
            } else {
                AppError::Internal(e)
            }
        })?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    if order.payment_status == PaymentStatus::Paid {
        apply_stock_once(&state, order.id).await;
    }
    Ok(ok("Order updated", reload(&state, order).await?))
}

#[instrument(skip(state))]
pub async fn user_orders(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<ApiJson<OrderList>> {
    if user_id != auth.id && !auth.is_admin() {
        warn!(caller = %auth.id, target = %user_id, "order history of another user");
        return Err(AppError::forbidden("You can only view your own orders"));
    }
    let orders = Order::list_for_customer(&state.db, user_id).await?;
    Ok(ok(
        "Orders fetched",
        OrderList {
            total: orders.len(),
            orders,
        },
    ))
}

#[instrument(skip(state, _admin))]
pub async fn all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<ApiJson<OrderList>> {
    let orders = Order::list_all(&state.db).await?;
    Ok(ok(
        "Orders fetched",
        OrderList {
            total: orders.len(),
            orders,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{call, token_for};
    use crate::users::repo_types::User;
    use serde_json::json;

    #[tokio::test]
    async fn empty_cod_order_is_rejected() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, body) = call(
            state,
            "POST",
            "/api/v1/orders/create",
            Some(json!({ "cartItems": [] })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid cart items");
    }

    #[tokio::test]
    async fn stripe_order_needs_session_id() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, body) = call(
            state,
            "POST",
            "/api/v1/orders/create-stripe-order",
            Some(json!({
                "cartItems": [{ "productId": Uuid::new_v4(), "price": 10, "quantity": 1 }]
            })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing stripeSessionId");
    }

    #[tokio::test]
    async fn other_users_history_is_forbidden() {
        let state = AppState::fake();
        let token = token_for(&state, User::ROLE_USER);
        let (status, _) = call(
            state,
            "GET",
            &format!("/api/v1/orders/user/{}", Uuid::new_v4()),
            None,
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn all_orders_is_admin_only() {
        let (status, _) = call(AppState::fake(), "GET", "/api/v1/orders/all", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
