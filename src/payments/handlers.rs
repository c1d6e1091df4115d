use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use secrecy::ExposeSecret;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CheckoutCreated, CheckoutRequest, CompletedSession, StripeEvent, WebhookAck},
    stripe::{verify_webhook_signature, CheckoutSessionParams, LineItem},
};
use crate::{
    error::{AppError, AppResult},
    orders::{
        repo_types::NewOrder,
        services::{apply_stock_once, validate_items},
        Order, OrderItem, PaymentMethod, PaymentStatus,
    },
    response::{ok, ApiJson},
    state::AppState,
    users::repo_types::User,
};

const GUEST_EMAIL: &str = "guest@example.com";
const GUEST_NAME: &str = "Guest";

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/webhook", post(stripe_webhook))
}

/// Price in the smallest currency unit, rounded half away from zero.
fn minor_units(price: Decimal) -> AppResult<i64> {
    (price * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::bad_request("Item price out of range"))
}

fn line_items(items: &[OrderItem]) -> AppResult<Vec<LineItem>> {
    items
        .iter()
        .map(|item| {
            Ok(LineItem {
                name: if item.title.trim().is_empty() {
                    "Item".to_string()
                } else {
                    item.title.clone()
                },
                unit_amount: minor_units(item.price)?,
                quantity: i64::from(item.quantity),
            })
        })
        .collect()
}

#[instrument(skip(state, payload))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<ApiJson<CheckoutCreated>> {
    validate_items(&payload.cart_items)?;
    let user = payload.user_data.unwrap_or_default();

    let params = CheckoutSessionParams {
        currency: state.config.stripe.currency.clone(),
        line_items: line_items(&payload.cart_items)?,
        success_url: format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            state.config.frontend_url
        ),
        cancel_url: format!("{}/cart", state.config.frontend_url),
        metadata: vec![
            (
                "customerEmail".into(),
                user.email.unwrap_or_else(|| GUEST_EMAIL.into()),
            ),
            (
                "customerName".into(),
                user.name.unwrap_or_else(|| GUEST_NAME.into()),
            ),
            ("customerId".into(), user.id.unwrap_or_default()),
        ],
    };

    let session = state
        .stripe
        .create_checkout_session(&params)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;

    info!(session_id = %session.id, items = params.line_items.len(), "checkout session created");
    Ok(ok(
        "Checkout session created",
        CheckoutCreated {
            id: session.id,
            url: session.url,
        },
    ))
}

#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("Missing Stripe-Signature header"))?;

    verify_webhook_signature(
        &body,
        signature,
        state.config.stripe.webhook_secret.expose_secret(),
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "webhook signature rejected");
        AppError::bad_request(format!("Webhook Error: {e}"))
    })?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Webhook Error: {e}")))?;

    if event.kind == "checkout.session.completed" {
        let session: CompletedSession = serde_json::from_value(event.data.object)
            .map_err(|e| AppError::bad_request(format!("Webhook Error: {e}")))?;
        record_completed_session(&state, session).await?;
    } else {
        info!(kind = %event.kind, "webhook event ignored");
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Creates the paid order for the session, or flips an existing one to paid.
async fn record_completed_session(state: &AppState, session: CompletedSession) -> AppResult<()> {
    if let Some(order) = Order::mark_session_paid(&state.db, &session.id).await? {
        info!(order_id = %order.id, session_id = %session.id, "order marked paid");
        apply_stock_once(state, order.id).await;
        return Ok(());
    }

    let customer_id = match session
        .metadata
        .get("customerId")
        .and_then(|raw| Uuid::parse_str(raw).ok())
    {
        Some(id) => User::find_by_id(&state.db, id).await?.map(|u| u.id),
        None => None,
    };
    let total = Decimal::new(session.amount_total.unwrap_or(0), 2);

    let inserted = Order::insert_for_session_if_absent(
        &state.db,
        NewOrder {
            items: Vec::new(),
            total_amount: total,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Stripe,
            stripe_session_id: Some(session.id.clone()),
            customer_id,
            customer_name: Some(
                session
                    .metadata
                    .get("customerName")
                    .cloned()
                    .unwrap_or_else(|| GUEST_NAME.into()),
            ),
            customer_email: session
                .customer_email
                .or_else(|| session.metadata.get("customerEmail").cloned()),
            shipment_address: None,
        },
    )
    .await?;

    match inserted {
        Some(order) => {
            info!(order_id = %order.id, session_id = %session.id, "order created from webhook");
            apply_stock_once(state, order.id).await;
        }
        None => info!(session_id = %session.id, "session already recorded"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::stripe::sign_payload;
    use crate::state::testing::{call, seed_product, seed_user, stock_of, token_as, with_db};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::collections::HashMap;
    use tower::ServiceExt;

    #[test]
    fn minor_units_round_to_cents() {
        assert_eq!(minor_units(Decimal::new(1999, 2)).unwrap(), 1999);
        assert_eq!(minor_units(Decimal::new(12345, 3)).unwrap(), 1235);
        assert_eq!(minor_units(Decimal::from(250)).unwrap(), 25000);
    }

    #[test]
    fn untitled_items_get_a_name() {
        let items = vec![OrderItem {
            product_id: Uuid::nil(),
            title: " ".into(),
            quantity: 3,
            price: Decimal::new(500, 2),
            picture_url: String::new(),
        }];
        let lines = line_items(&items).unwrap();
        assert_eq!(lines[0].name, "Item");
        assert_eq!(lines[0].unit_amount, 500);
        assert_eq!(lines[0].quantity, 3);
    }

    #[tokio::test]
    async fn checkout_returns_session_id() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(json!({
                "cartItems": [
                    { "productId": Uuid::new_v4(), "title": "Mug", "price": 12.5, "quantity": 2 },
                    { "productId": Uuid::new_v4(), "title": "Tee", "price": 20, "quantity": 1 }
                ],
                "userData": { "_id": "abc", "name": "Sam" }
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "cs_test_2");
    }

    #[tokio::test]
    async fn checkout_rejects_empty_cart() {
        let (status, body) = call(
            AppState::fake(),
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(json!({ "cartItems": [] })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid cart items");
    }

    async fn post_webhook(state: AppState, payload: &str, signature: Option<String>) -> StatusCode {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook");
        if let Some(sig) = signature {
            req = req.header("stripe-signature", sig);
        }
        let req = req.body(Body::from(payload.to_string())).expect("request");
        crate::app::build_app(state)
            .oneshot(req)
            .await
            .expect("router is infallible")
            .status()
    }

    #[tokio::test]
    async fn webhook_without_signature_is_rejected() {
        let status = post_webhook(AppState::fake(), "{}", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_wrong_signature_is_rejected() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let status = post_webhook(
            AppState::fake(),
            r#"{"type":"ping","data":{"object":{}}}"#,
            Some(format!("t={now},v1=00ff")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_event_types_are_acknowledged() {
        let payload = r#"{"type":"payment_intent.created","data":{"object":{}}}"#;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let sig = sign_payload(payload.as_bytes(), now, "whsec_test");
        let status =
            post_webhook(AppState::fake(), payload, Some(format!("t={now},v1={sig}"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    fn completed(session_id: &str, amount_total: i64) -> CompletedSession {
        CompletedSession {
            id: session_id.into(),
            amount_total: Some(amount_total),
            customer_email: Some("sam@shop.test".into()),
            metadata: HashMap::new(),
        }
    }

    async fn client_callback(
        state: &AppState,
        token: &str,
        session_id: &str,
        product: Uuid,
    ) -> (StatusCode, serde_json::Value) {
        call(
            state.clone(),
            "POST",
            "/api/v1/orders/create-stripe-order",
            Some(json!({
                "stripeSessionId": session_id,
                "cartItems": [{ "productId": product, "title": "Mug", "price": 10, "quantity": 2 }],
                "customerName": "Sam"
            })),
            Some(token),
        )
        .await
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn webhook_then_callback_takes_stock_once(db: sqlx::PgPool) {
        let user = seed_user(&db, "sam@shop.test", User::ROLE_USER).await;
        let mug = seed_product(&db, "Mug", 10).await;
        let state = with_db(db);
        let token = token_as(&state, user, User::ROLE_USER);

        record_completed_session(&state, completed("cs_a", 2000)).await.unwrap();
        record_completed_session(&state, completed("cs_a", 2000)).await.unwrap();
        assert_eq!(stock_of(&state.db, mug).await, 10);

        let (status, body) = client_callback(&state, &token, "cs_a", mug).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["paymentStatus"], "paid");
        assert_eq!(stock_of(&state.db, mug).await, 8);

        client_callback(&state, &token, "cs_a", mug).await;
        assert_eq!(stock_of(&state.db, mug).await, 8);

        let order = Order::find_by_session(&state.db, "cs_a").await.unwrap().unwrap();
        assert_eq!(order.cart_items.0.len(), 1);
        assert_eq!(order.total_amount, Decimal::from(20));
        assert!(order.stock_applied);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn callback_then_webhook_takes_stock_once(db: sqlx::PgPool) {
        let user = seed_user(&db, "sam@shop.test", User::ROLE_USER).await;
        let mug = seed_product(&db, "Mug", 10).await;
        let state = with_db(db);
        let token = token_as(&state, user, User::ROLE_USER);

        let (status, _) = client_callback(&state, &token, "cs_b", mug).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stock_of(&state.db, mug).await, 8);

        record_completed_session(&state, completed("cs_b", 2000)).await.unwrap();
        assert_eq!(stock_of(&state.db, mug).await, 8);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE stripe_session_id = 'cs_b'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn pending_session_order_is_paid_once(db: sqlx::PgPool) {
        let user = seed_user(&db, "sam@shop.test", User::ROLE_USER).await;
        let mug = seed_product(&db, "Mug", 10).await;
        let state = with_db(db);

        let order = Order::insert(
            &state.db,
            NewOrder {
                items: vec![OrderItem {
                    product_id: mug,
                    title: "Mug".into(),
                    quantity: 3,
                    price: Decimal::from(10),
                    picture_url: String::new(),
                }],
                total_amount: Decimal::from(30),
                payment_status: PaymentStatus::Pending,
                payment_method: PaymentMethod::Stripe,
                stripe_session_id: Some("cs_c".into()),
                customer_id: Some(user),
                customer_name: None,
                customer_email: None,
                shipment_address: None,
            },
        )
        .await
        .unwrap();
        apply_stock_once(&state, order.id).await;
        assert_eq!(stock_of(&state.db, mug).await, 10);

        record_completed_session(&state, completed("cs_c", 3000)).await.unwrap();
        assert!(Order::mark_session_paid(&state.db, "cs_c").await.unwrap().is_none());
        record_completed_session(&state, completed("cs_c", 3000)).await.unwrap();

        assert_eq!(stock_of(&state.db, mug).await, 7);
        let order = Order::find(&state.db, order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }
}
