mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo_types::{Order, OrderItem, PaymentMethod, PaymentStatus};

pub fn router() -> Router<AppState> {
    Router::new().nest("/orders", handlers::order_routes())
}
