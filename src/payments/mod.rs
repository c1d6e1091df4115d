mod dto;
pub mod handlers;
pub mod stripe;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().nest("/payments", handlers::payment_routes())
}
