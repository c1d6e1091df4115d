use anyhow::Context;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::repo_types::{NewOrder, Order, OrderItem, PaymentStatus};

const ORDER_COLUMNS: &str = "id, cart_items, total_amount, payment_status, payment_method, \
                             stripe_session_id, customer_id, customer_name, customer_email, \
                             shipment_address, stock_applied, created_at, updated_at";

const INSERT_ORDER: &str = r#"
    INSERT INTO orders
        (cart_items, total_amount, payment_status, payment_method, stripe_session_id,
         customer_id, customer_name, customer_email, shipment_address)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

fn bind_new<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Order, sqlx::postgres::PgArguments>,
    new: NewOrder,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Order, sqlx::postgres::PgArguments> {
    query
        .bind(Json(new.items))
        .bind(new.total_amount)
        .bind(new.payment_status)
        .bind(new.payment_method)
        .bind(new.stripe_session_id)
        .bind(new.customer_id)
        .bind(new.customer_name)
        .bind(new.customer_email)
        .bind(new.shipment_address.map(Json))
}

impl Order {
    pub async fn insert(db: &PgPool, new: NewOrder) -> anyhow::Result<Order> {
        let sql = format!("{INSERT_ORDER} RETURNING {ORDER_COLUMNS}");
        let order = bind_new(sqlx::query_as::<_, Order>(&sql), new)
            .fetch_one(db)
            .await
            .context("insert order")?;
        Ok(order)
    }

    /// Inserts unless an order for the same Stripe session exists; `None`
    /// means someone else got there first.
    pub async fn insert_for_session_if_absent(
        db: &PgPool,
        new: NewOrder,
    ) -> anyhow::Result<Option<Order>> {
        let sql = format!(
            "{INSERT_ORDER} ON CONFLICT (stripe_session_id) DO NOTHING RETURNING {ORDER_COLUMNS}"
        );
        let order = bind_new(sqlx::query_as::<_, Order>(&sql), new)
            .fetch_optional(db)
            .await
            .context("insert session order")?;
        Ok(order)
    }

    /// Creates the paid order for a session, or completes the one the webhook
    /// already created: empty items and missing customer fields are filled
    /// in, while an amount Stripe reported is kept.
    pub async fn upsert_for_session(db: &PgPool, new: NewOrder) -> anyhow::Result<Order> {
        let sql = format!(
            r#"
            {INSERT_ORDER}
            ON CONFLICT (stripe_session_id) DO UPDATE SET
                cart_items = CASE WHEN jsonb_array_length(orders.cart_items) = 0
                                  THEN EXCLUDED.cart_items ELSE orders.cart_items END,
                total_amount = CASE WHEN orders.total_amount = 0
                                    THEN EXCLUDED.total_amount ELSE orders.total_amount END,
                payment_status = 'paid',
                customer_id = COALESCE(orders.customer_id, EXCLUDED.customer_id),
                customer_name = COALESCE(EXCLUDED.customer_name, orders.customer_name),
                customer_email = COALESCE(orders.customer_email, EXCLUDED.customer_email),
                shipment_address = COALESCE(EXCLUDED.shipment_address, orders.shipment_address),
                updated_at = now()
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order = bind_new(sqlx::query_as::<_, Order>(&sql), new)
            .fetch_one(db)
            .await
            .context("upsert session order")?;
        Ok(order)
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find order")?;
        Ok(order)
    }

    pub async fn find_by_session(db: &PgPool, session_id: &str) -> anyhow::Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE stripe_session_id = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(session_id)
            .fetch_optional(db)
            .await
            .context("find order by session")?;
        Ok(order)
    }

    pub async fn update_payment(
        db: &PgPool,
        id: Uuid,
        session_id: Option<&str>,
        status: PaymentStatus,
    ) -> anyhow::Result<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
               SET stripe_session_id = COALESCE($2, stripe_session_id),
                   payment_status = $3,
                   updated_at = now()
             WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(session_id)
            .bind(status)
            .fetch_optional(db)
            .await
            .context("update order payment")?;
        Ok(order)
    }

    /// Moves the session's order to paid if it is not already. Returns the
    /// order only when this call made the transition.
    pub async fn mark_session_paid(db: &PgPool, session_id: &str) -> anyhow::Result<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
               SET payment_status = 'paid', updated_at = now()
             WHERE stripe_session_id = $1 AND payment_status <> 'paid'
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(session_id)
            .fetch_optional(db)
            .await
            .context("mark session paid")?;
        Ok(order)
    }

    pub async fn list_for_customer(db: &PgPool, customer_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(customer_id)
            .fetch_all(db)
            .await
            .context("list customer orders")?;
        Ok(orders)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC");
        let orders = sqlx::query_as::<_, Order>(&sql)
            .fetch_all(db)
            .await
            .context("list orders")?;
        Ok(orders)
    }

    /// Flags the order's stock as taken and hands back its items, once.
    /// Only COD orders and paid orders with items qualify; every later call
    /// returns `None`.
    pub async fn claim_stock(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Vec<OrderItem>>> {
        let items: Option<Json<Vec<OrderItem>>> = sqlx::query_scalar(
            r#"
            UPDATE orders
               SET stock_applied = TRUE
             WHERE id = $1
               AND NOT stock_applied
               AND jsonb_array_length(cart_items) > 0
               AND (payment_method = 'cod' OR payment_status = 'paid')
            RETURNING cart_items
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
        .context("claim order stock")?;
        Ok(items.map(|Json(items)| items))
    }
}
